//! Supported languages: source file naming, build artifacts, and in-box
//! run commands.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Go,
}

/// A runnable build product: the files to stage into the sandbox and the
/// command to start it there.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub stage: Vec<PathBuf>,
    pub command: Vec<String>,
}

impl Language {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "python" | "py" | "python3" => Ok(Language::Python),
            "go" | "golang" => Ok(Language::Go),
            other => Err(Error::InvalidArgument(format!(
                "unsupported language: {}",
                other
            ))),
        }
    }

    /// Infer a language from a file name's extension; used for the special
    /// judge program whose language is carried only by its name.
    pub fn from_extension(file_name: &str) -> Result<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "c" => Ok(Language::C),
            "cpp" | "cc" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "py" => Ok(Language::Python),
            "go" => Ok(Language::Go),
            _ => Err(Error::InvalidArgument(format!(
                "cannot infer language from file name: {}",
                file_name
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Go => "go",
        }
    }

    /// Canonical source file name inside a scratch directory.
    pub fn source_file_name(self) -> &'static str {
        match self {
            Language::C => "main.c",
            Language::Cpp => "main.cpp",
            Language::Java => "Main.java",
            Language::Python => "main.py",
            Language::Go => "main.go",
        }
    }

    /// Resolve the runnable artifact for this language from a scratch
    /// directory after a successful compile.
    pub fn artifact(self, scratch: &Path, exe_name: &str) -> Result<Artifact> {
        match self {
            Language::C | Language::Cpp | Language::Go => {
                let exe = scratch.join(exe_name);
                if !exe.exists() {
                    return Err(Error::SandboxInternal(format!(
                        "compiled artifact missing: {}",
                        exe.display()
                    )));
                }
                Ok(Artifact {
                    stage: vec![exe],
                    command: vec![format!("./{}", exe_name)],
                })
            }
            Language::Java => {
                // javac drops Main.class (plus any inner classes) into the
                // scratch directory; stage them all.
                let mut stage = Vec::new();
                for entry in std::fs::read_dir(scratch)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("class") {
                        stage.push(path);
                    }
                }
                if stage.is_empty() {
                    return Err(Error::SandboxInternal(
                        "no class files produced by javac".into(),
                    ));
                }
                Ok(Artifact {
                    stage,
                    command: vec![
                        "/usr/bin/java".into(),
                        "-cp".into(),
                        ".".into(),
                        "Main".into(),
                    ],
                })
            }
            Language::Python => {
                let source = scratch.join(self.source_file_name());
                Ok(Artifact {
                    stage: vec![source],
                    command: vec!["/usr/bin/python3".into(), self.source_file_name().into()],
                })
            }
        }
    }
}
