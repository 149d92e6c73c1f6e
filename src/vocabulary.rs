//! Word lists loaded once at startup

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Ordered candidate commands for the NLU service
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandVocabulary {
    sentences: Vec<String>,
}

impl CommandVocabulary {
    pub fn new(sentences: Vec<String>) -> Self {
        Self { sentences }
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wake phrases, one per line
pub fn load_keywords(path: impl AsRef<Path>) -> Result<Vec<String>> {
    Ok(parse_lines(&read(path.as_ref())?))
}

/// Command sentences, one per line
pub fn load_commands(path: impl AsRef<Path>) -> Result<CommandVocabulary> {
    Ok(CommandVocabulary::new(parse_lines(&read(path.as_ref())?)))
}

/// ASR hotwords as `word weight` lines
pub fn load_hotwords(path: impl AsRef<Path>) -> Result<BTreeMap<String, i32>> {
    let path = path.as_ref();
    parse_hotwords(&read(path)?).with_context(|| format!("Invalid hotword file {}", path.display()))
}

pub fn parse_hotwords(contents: &str) -> Result<BTreeMap<String, i32>> {
    let mut hotwords = BTreeMap::new();

    for (index, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [word, weight] => {
                let weight: i32 = weight.parse().with_context(|| {
                    format!("Line {}: weight '{}' is not an integer", index + 1, weight)
                })?;
                hotwords.insert(word.to_string(), weight);
            }
            _ => bail!(
                "Line {}: expected 'word weight', got {} fields",
                index + 1,
                fields.len()
            ),
        }
    }

    Ok(hotwords)
}
