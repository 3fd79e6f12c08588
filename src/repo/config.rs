//! A minimal Git config (INI-like) reader for the repository's `config`
//! named file: `[section]` / `[section "subsection"]` headers, `key = value`
//! lines, `#`/`;` comments. Not a full implementation of Git's config
//! grammar (no include directives, no multi-valued keys) — this crate only
//! ever reads back what its own `init_bare` wrote.

use std::collections::HashMap;

/// A parsed `config` file: `(section, subsection)` to `key -> value`.
#[derive(Debug, Clone, Default)]
pub struct GitConfig {
    sections: HashMap<(String, Option<String>), HashMap<String, String>>,
}

impl GitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(contents: &[u8]) -> Self {
        let text = String::from_utf8_lossy(contents);
        let mut config = Self::new();
        let mut current: (String, Option<String>) = (String::new(), None);

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = parse_section_header(header);
                config.sections.entry(current.clone()).or_default();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_lowercase();
                let value = value.trim().trim_matches('"').to_string();
                config
                    .sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key, value);
            }
        }

        config
    }

    pub fn get(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<&str> {
        self.sections
            .get(&(section.to_lowercase(), subsection.map(str::to_string)))
            .and_then(|kv| kv.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, subsection: Option<&str>, key: &str, value: &str) {
        self.sections
            .entry((section.to_lowercase(), subsection.map(str::to_string)))
            .or_default()
            .insert(key.to_lowercase(), value.to_string());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for ((section, subsection), kv) in &self.sections {
            match subsection {
                Some(sub) => out.push_str(&format!("[{section} \"{sub}\"]\n")),
                None => out.push_str(&format!("[{section}]\n")),
            }
            for (key, value) in kv {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        out.into_bytes()
    }
}

fn parse_section_header(header: &str) -> (String, Option<String>) {
    match header.split_once(' ') {
        Some((section, rest)) => {
            let sub = rest.trim().trim_matches('"').to_string();
            (section.trim().to_string(), Some(sub))
        }
        None => (header.trim().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section_and_subsection() {
        let config = GitConfig::parse(b"[core]\n\tbare = true\n[remote \"origin\"]\n\turl = https://example.com/repo.git\n");
        assert_eq!(config.get("core", None, "bare"), Some("true"));
        assert_eq!(config.get("remote", Some("origin"), "url"), Some("https://example.com/repo.git"));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let config = GitConfig::parse(b"# comment\n\n[core]\n; another comment\n\tbare = true\n");
        assert_eq!(config.get("core", None, "bare"), Some("true"));
    }

    #[test]
    fn round_trips_through_to_bytes() {
        let mut config = GitConfig::new();
        config.set("core", None, "bare", "true");
        let bytes = config.to_bytes();
        let reparsed = GitConfig::parse(&bytes);
        assert_eq!(reparsed.get("core", None, "bare"), Some("true"));
    }
}
