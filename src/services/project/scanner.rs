//! Discovery of rulebook files in a project checkout.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use super::ImportError;

/// Directories searched for rulebooks, in priority order.
pub const RULEBOOK_DIRS: [&str; 2] = ["extensions/eda/rulebooks", "rulebooks"];

const YAML_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// A rulebook file found in a checkout.
#[derive(Debug, Clone)]
pub struct RulebookInfo {
    /// Location relative to the checkout root
    pub relpath: PathBuf,
    /// File content exactly as read
    pub raw_content: String,
    pub content: Value,
}

impl RulebookInfo {
    /// Split the relative path into its directory and file name.
    pub fn split_relpath(&self) -> (String, String) {
        let dir = self
            .relpath
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = self
            .relpath
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        (dir, name)
    }
}

/// Single-pass iterator over the rulebooks of a checkout.
///
/// Files that fail to load are logged and skipped; they never end the scan.
pub struct RulebookScanner {
    repo_root: PathBuf,
    walker: walkdir::IntoIter,
}

impl RulebookScanner {
    pub fn new(repo_root: &Path) -> Result<Self, ImportError> {
        let rulebooks_dir = RULEBOOK_DIRS
            .iter()
            .map(|name| repo_root.join(name))
            .find(|path| path.exists())
            .ok_or(ImportError::MissingRulebooksDir)?;

        debug!(dir = %rulebooks_dir.display(), "Scanning for rulebooks");

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            walker: WalkDir::new(rulebooks_dir).sort_by_file_name().into_iter(),
        })
    }

    fn try_load_rulebook(&self, path: &Path) -> std::io::Result<Option<RulebookInfo>> {
        let raw_content = std::fs::read_to_string(path)?;

        let content: Value = match serde_yaml::from_str(&raw_content) {
            Ok(content) => content,
            Err(err) => {
                warn!("Invalid YAML file {}: {}", path.display(), err);
                return Ok(None);
            }
        };

        if !is_rulebook_file(&content) {
            return Ok(None);
        }

        let relpath = path
            .strip_prefix(&self.repo_root)
            .map_err(std::io::Error::other)?
            .to_path_buf();

        Ok(Some(RulebookInfo {
            relpath,
            raw_content,
            content,
        }))
    }
}

impl Iterator for RulebookScanner {
    type Item = RulebookInfo;

    fn next(&mut self) -> Option<RulebookInfo> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Unexpected error when scanning project files: {}. Skipping.", err);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !has_yaml_extension(path) {
                continue;
            }

            match self.try_load_rulebook(path) {
                Ok(Some(info)) => return Some(info),
                Ok(None) => debug!("Not a rulebook file: {}", path.display()),
                Err(err) => error!(
                    "Unexpected exception when scanning file {}: {}. Skipping.",
                    path.display(),
                    err
                ),
            }
        }
    }
}

fn has_yaml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| YAML_EXTENSIONS.contains(&ext))
}

/// A rulebook is a list of rulesets, each declaring `rules`.
pub fn is_rulebook_file(content: &Value) -> bool {
    match content {
        Value::Sequence(entries) => entries.iter().all(|entry| entry.get("rules").is_some()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relpath: &str, content: &str) {
        let path = root.join(relpath);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn scan(root: &Path) -> Vec<RulebookInfo> {
        RulebookScanner::new(root).unwrap().collect()
    }

    const RULEBOOK: &str = "---\n- name: hello\n  hosts: all\n  sources: []\n  rules:\n    - name: say hi\n      condition: event.i == 1\n      action:\n        debug:\n";

    #[test]
    fn test_is_rulebook_file() {
        let list: Value = serde_yaml::from_str("- rules: []\n- name: x\n  rules: []\n").unwrap();
        assert!(is_rulebook_file(&list));

        let mapping: Value = serde_yaml::from_str("rules: []\n").unwrap();
        assert!(!is_rulebook_file(&mapping));

        let missing: Value = serde_yaml::from_str("- rules: []\n- name: x\n").unwrap();
        assert!(!is_rulebook_file(&missing));

        let scalars: Value = serde_yaml::from_str("- a\n- b\n").unwrap();
        assert!(!is_rulebook_file(&scalars));

        let empty: Value = serde_yaml::from_str("[]").unwrap();
        assert!(is_rulebook_file(&empty));
    }

    #[test]
    fn test_missing_rulebooks_dir() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "playbooks/site.yml", RULEBOOK);

        let err = RulebookScanner::new(dir.path()).err().unwrap();
        assert!(matches!(err, ImportError::MissingRulebooksDir));
        assert_eq!(
            err.to_string(),
            "The 'extensions/eda/rulebooks' or 'rulebooks' directory doesn't exist within the project root."
        );
    }

    #[test]
    fn test_extensions_dir_takes_priority() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "extensions/eda/rulebooks/a.yml", RULEBOOK);
        write(dir.path(), "rulebooks/b.yml", RULEBOOK);

        let found = scan(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].relpath,
            PathBuf::from("extensions/eda/rulebooks/a.yml")
        );
    }

    #[test]
    fn test_filters_and_skips() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "rulebooks/app.yml", RULEBOOK);
        write(dir.path(), "rulebooks/nested/deep.yaml", RULEBOOK);
        write(dir.path(), "rulebooks/upper.YML", RULEBOOK);
        write(dir.path(), "rulebooks/notes.txt", RULEBOOK);
        write(dir.path(), "rulebooks/vars.yml", "key: value\n");
        write(dir.path(), "rulebooks/broken.yml", "- rules: [\n");
        write(dir.path(), "rulebooks/empty.yml", "");
        std::fs::write(dir.path().join("rulebooks/binary.yml"), [0xff, 0xfe, 0x00]).unwrap();

        let found = scan(dir.path());
        let paths: Vec<_> = found.iter().map(|i| i.relpath.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("rulebooks/app.yml"),
                PathBuf::from("rulebooks/nested/deep.yaml"),
            ]
        );
    }

    #[test]
    fn test_raw_content_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let raw = "# comment kept\n- rules:   []   \n";
        write(dir.path(), "rulebooks/app.yml", raw);

        let found = scan(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw_content, raw);
        assert!(found[0].content.is_sequence());
    }

    #[test]
    fn test_split_relpath() {
        let info = RulebookInfo {
            relpath: PathBuf::from("rulebooks/sub/app.yml"),
            raw_content: String::new(),
            content: Value::Null,
        };
        assert_eq!(
            info.split_relpath(),
            ("rulebooks/sub".to_string(), "app.yml".to_string())
        );
    }
}
