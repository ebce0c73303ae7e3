use sr_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn default_languages() {
    let config = Config::default();
    assert_eq!(config.streamer.source_lang, "ja-JP");
    assert_eq!(config.streamer.alt_langs, vec!["en-US".to_string()]);
}

#[test]
fn minimal_yaml_parses_with_defaults() {
    let yaml = r#"
streamer:
  room_id: 92613
outputs:
  - name: zh
    target_lang: zh-CN
    account: bot1
    prefix: "【"
    suffix: "】"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.streamer.room_id, 92613);
    assert_eq!(config.controller.send_delay_ms, 3000);
    assert_eq!(config.outputs.len(), 1);
    assert_eq!(config.outputs[0].account_names(), vec!["bot1".to_string()]);
    assert!(!config.outputs[0].show_seq);
}

#[test]
fn account_defaults() {
    let yaml = r#"
accounts:
  - name: bot1
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.accounts[0].max_message_len, 20);
    assert_eq!(config.accounts[0].cooldown_ms, 2000);
    assert_eq!(config.accounts[0].platform, "bilibili");
}
