use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Director analysis step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Agent picked when the model names an unknown agent.
    #[serde(default = "d_default_agent_id")]
    pub default_agent_id: String,

    /// Agent id stamped on the analysis message group.
    #[serde(default = "d_director_agent_id")]
    pub director_agent_id: String,

    /// Cap on model-selected materials (forced materials are added on top).
    #[serde(default = "d_max_relevant_materials")]
    pub max_relevant_materials: usize,

    /// Force the model to call the plan function.
    #[serde(default = "d_true")]
    pub force_call: bool,

    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "d_last_system_prompt")]
    pub last_system_prompt: String,

    /// Agents the director may hand the conversation to.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Materials the director may attach.
    #[serde(default)]
    pub materials: Vec<MaterialConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_agent_id: d_default_agent_id(),
            director_agent_id: d_director_agent_id(),
            max_relevant_materials: d_max_relevant_materials(),
            force_call: true,
            system_prompt: d_system_prompt(),
            last_system_prompt: d_last_system_prompt(),
            agents: vec![AgentConfig {
                id: d_default_agent_id(),
                name: "Assistant".into(),
                usage: "General purpose assistant".into(),
            }],
            materials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// When the director should pick this agent.
    #[serde(default)]
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub id: String,
    #[serde(default)]
    pub status: MaterialStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    /// Selectable by the director.
    #[default]
    Enabled,
    /// Always attached.
    Forced,
    Disabled,
}

fn d_default_agent_id() -> String {
    "assistant".into()
}

fn d_director_agent_id() -> String {
    "director".into()
}

fn d_max_relevant_materials() -> usize {
    5
}

fn d_true() -> bool {
    true
}

fn d_system_prompt() -> String {
    "You are a director of a multi-agent conversation. Decide who speaks next \
     and what they should do."
        .into()
}

fn d_last_system_prompt() -> String {
    "Call the plan function with your decision.".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_assistant_agent() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.default_agent_id, "assistant");
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].id, "assistant");
        assert_eq!(cfg.max_relevant_materials, 5);
    }

    #[test]
    fn material_status_parses_snake_case() {
        let m: MaterialConfig = toml::from_str("id = \"docs\"\nstatus = \"forced\"").unwrap();
        assert_eq!(m.status, MaterialStatus::Forced);

        let m: MaterialConfig = toml::from_str("id = \"docs\"").unwrap();
        assert_eq!(m.status, MaterialStatus::Enabled);
    }
}
