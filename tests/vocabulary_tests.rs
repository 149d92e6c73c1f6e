// Integration tests for word list files

use anyhow::Result;
use speech_assistant::vocabulary::{load_commands, load_hotwords, load_keywords};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_keywords() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("words_kws.txt");
    fs::write(&path, "小新小新\n\n小爱同学\n")?;

    assert_eq!(load_keywords(&path)?, vec!["小新小新", "小爱同学"]);
    Ok(())
}

#[test]
fn test_load_commands_keeps_order() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("words_nlu.txt");
    fs::write(&path, "开启wps软件\n关闭wps软件\n打开浏览器\n")?;

    let commands = load_commands(&path)?;
    assert_eq!(commands.sentences(), ["开启wps软件", "关闭wps软件", "打开浏览器"]);
    Ok(())
}

#[test]
fn test_load_hotwords_error_names_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("words_asr.txt");
    fs::write(&path, "小米手机 twenty\n")?;

    let err = load_hotwords(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("words_asr.txt"));
    Ok(())
}

#[test]
fn test_missing_file() {
    assert!(load_keywords("/nonexistent/words_kws.txt").is_err());
    assert!(load_commands("/nonexistent/words_nlu.txt").is_err());
    assert!(load_hotwords("/nonexistent/words_asr.txt").is_err());
}
