//! Persona prompt for the assistant.
//!
//! The prompt is a plain value handed to [`super::Agent`] at construction,
//! so tests and deployments can swap the persona without touching globals.

/// Colleague listed in the persona roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colleague {
    pub name: String,
    pub role: String,
}

impl Colleague {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

/// Template for the assistant's system prompt
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Person the assistant works for.
    pub owner: String,
    /// Owner's job and company, e.g. "a data engineer at Tasman".
    pub owner_role: String,
    /// Free-form lines about tone and who usually asks for help.
    pub persona: Vec<String>,
    /// Organisation name used as the roster heading.
    pub organisation: String,
    pub colleagues: Vec<Colleague>,
}

const GUIDELINES: &str = "\
Be concise but thorough in your responses, and always aim to solve \
the underlying problem rather than just answering questions directly. \
If you're unsure about something, it's better to ask for clarification.";

const TOOL_POLICY: &str = "\
## Tool usage

- You have tools that let you memorize things. Use them liberally to store \
information and the questions people ask you. Before responding to a new \
question, check your memory for anything relevant and use it.
- Read-only project-management and document-reading tools (searching issues, \
reading pages, listing projects) can be used freely.
- NEVER call a tool that creates, updates, or deletes anything outside your \
memory: no new issues, comments, pages, messages, or status changes. If a \
request needs such a change, explain what should be done instead.";

impl Default for PromptTemplate {
    fn default() -> Self {
        let roster = [
            ("Ben", "Data Analyst"),
            ("Patrick", "Data Analyst / Data Product Manager"),
            ("Tommy", "Data Analyst"),
            ("Will", "Data Analyst"),
            ("Caro", "Data Analyst"),
            ("Aileen", "Operations Manager"),
            ("Eric", "Head of Engineering"),
            ("Ho Yin", "Analytics Engineer"),
            ("Jim", "Analytics Engineer"),
            ("Jurri", "Analytics Engineer"),
            ("Kitti", "Analytics Engineer"),
            ("Marcello", "Data Engineer"),
            ("Miguel", "Data Engineer"),
            ("Nastya", "Data Engineer"),
            ("Thomas", "CEO"),
            ("Rob", "Head of Data Strategy & Co-founder"),
        ];

        Self {
            owner: "Jovan".to_string(),
            owner_role: "a data engineer at Tasman".to_string(),
            persona: vec![
                "He helps his teammates from the company. Depending on who asks for help, \
                 he tailors his responses to be more or less technical."
                    .to_string(),
                "He works on the Fuji squad and usually communicates in a witty tone, \
                 but is always trying to be very helpful. His colleagues often ask for \
                 support on questions around IT operations."
                    .to_string(),
            ],
            organisation: "Tasman".to_string(),
            colleagues: roster.iter().map(|(n, r)| Colleague::new(*n, *r)).collect(),
        }
    }
}

impl PromptTemplate {
    /// Render the full system prompt.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(5);

        parts.push(format!(
            "You are {}'s helpful assistant. {} is {}.",
            self.owner, self.owner, self.owner_role
        ));

        if !self.persona.is_empty() {
            parts.push(self.persona.join("\n"));
        }

        parts.push(format!(
            "Your main goal is to assist {} and the people who ask for help by analyzing \
             their requests and providing useful information. You have access to various \
             tools that can help you fulfill these requests.\n\n{}",
            self.owner, GUIDELINES
        ));

        if !self.colleagues.is_empty() {
            let roster: Vec<String> = self.colleagues
                .iter()
                .map(|c| format!("- {}: {}", c.name, c.role))
                .collect();
            parts.push(format!(
                "People at {} and their roles:\n{}",
                self.organisation,
                roster.join("\n")
            ));
        }

        parts.push(TOOL_POLICY.to_string());

        parts.join("\n\n")
    }
}
