use std::path::PathBuf;

use staticserver::config::{ parse_config, parse_str };
use staticserver::error::ConfigError;

#[test]
fn empty_document_uses_defaults() {
    let config = parse_str("").unwrap();
    assert_eq!(config.port, 8080);
    assert_eq!(config.document_root, PathBuf::from("./www"));
    assert_eq!(config.read_buffer_size, 2048);
    assert_eq!(config.write_buffer_size, 1024);
    assert_eq!(config.max_path_len, 200);
    assert_eq!(config.max_connections, 65536);
    assert!(config.workers > 0);
    assert!(!config.linger_reset);
    assert!(config.reject_traversal);
}

#[test]
fn fields_override_defaults() {
    let config = parse_str(
        "host: 127.0.0.1\nport: 9000\ndocument_root: /srv/site\nworkers: 3\nlinger_reset: true\n"
    ).unwrap();
    assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:9000");
    assert_eq!(config.document_root, PathBuf::from("/srv/site"));
    assert_eq!(config.workers, 3);
    assert!(config.linger_reset);
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(matches!(parse_str("servers: []\n"), Err(ConfigError::Yaml(_))));
}

#[test]
fn invalid_values_are_rejected() {
    for doc in [
        "workers: 0\n",
        "max_connections: 0\n",
        "read_buffer_size: 0\n",
        "host: not-an-ip\n",
        "document_root: /a/very/long/root\nmax_path_len: 10\n",
    ] {
        assert!(matches!(parse_str(doc), Err(ConfigError::Invalid(_))), "{}", doc);
    }
}

#[test]
fn reads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "port: 8181\n").unwrap();
    assert_eq!(parse_config(&path).unwrap().port, 8181);

    assert!(matches!(parse_config(dir.path().join("absent.yaml")), Err(ConfigError::Io(_))));
}
