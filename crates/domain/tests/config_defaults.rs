use cs_domain::config::{Config, MaterialStatus};

#[test]
fn default_llm_reads_openai_key() {
    let config = Config::default();
    assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.llm.model, "gpt-4o");
}

#[test]
fn empty_document_is_default() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.persistence.coalesce_window_ms, 25);
    assert_eq!(config.analysis.director_agent_id, "director");
}

#[test]
fn sections_parse() {
    let toml_str = r#"
[persistence]
state_path = "/tmp/chats"
coalesce_window_ms = 100

[llm]
base_url = "http://localhost:11434/v1"
model = "llama3"

[analysis]
max_relevant_materials = 2

[[analysis.agents]]
id = "coder"
name = "Coder"
usage = "Writes code"

[[analysis.materials]]
id = "style-guide"
status = "forced"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.persistence.coalesce_window_ms, 100);
    assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
    assert_eq!(config.analysis.max_relevant_materials, 2);
    assert_eq!(config.analysis.agents.len(), 1);
    assert_eq!(config.analysis.agents[0].id, "coder");
    assert_eq!(config.analysis.materials[0].status, MaterialStatus::Forced);
}

#[test]
fn load_or_default_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.llm.provider_id, "openai");
}

#[test]
fn load_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[llm\nmodel = 3").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("parsing"));
}
