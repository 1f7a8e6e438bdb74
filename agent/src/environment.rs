//! Reads the `ENVIRONMENT` file (§6): a plain-text file in the process
//! working directory whose trimmed content sets the role. Missing or empty
//! ⇒ `"game"`, logged as a warning since it usually means a deploy mistake.

use std::path::Path;

const DEFAULT_ROLE: &str = "game";

pub fn read_role(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "ENVIRONMENT file unreadable, defaulting role to \"game\""
            );
            return DEFAULT_ROLE.to_string();
        }
    };
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        tracing::warn!(
            path = %path.display(),
            "ENVIRONMENT file is empty, defaulting role to \"game\""
        );
        DEFAULT_ROLE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_game() {
        assert_eq!(read_role("/nonexistent/ENVIRONMENT"), "game");
    }

    #[test]
    fn trims_and_returns_role() {
        let dir = std::env::temp_dir().join(format!("agent-env-test-{}", uuid::Uuid::new_v4()));
        std::fs::write(&dir, "  lobby\n").unwrap();
        assert_eq!(read_role(&dir), "lobby");
        std::fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn blank_file_defaults_to_game() {
        let dir = std::env::temp_dir().join(format!("agent-env-test-{}", uuid::Uuid::new_v4()));
        std::fs::write(&dir, "   \n").unwrap();
        assert_eq!(read_role(&dir), "game");
        std::fs::remove_file(&dir).unwrap();
    }
}
