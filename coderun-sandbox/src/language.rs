//! Language profiles: how each supported language is compiled and run

use crate::config::ToolchainConfig;
use crate::error::{ExecError, ExecResult};
use crate::types::StageCommand;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Cpp,
}

impl Language {
    /// Canonical identifier
    pub fn id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Cpp => "cpp",
        }
    }

    /// Guess a language from a file extension (with or without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            _ => Err(ExecError::UnsupportedLanguage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunRecipe {
    /// `<program> <args..> <source>`
    Interpreter { program: String, args: Vec<String> },
    /// Execute the compiled artifact with no arguments
    Artifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompileRecipe {
    program: String,
    flags: Vec<String>,
}

/// Static recipe for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    pub display_name: &'static str,
    /// Source file extension, including the dot
    pub extension: &'static str,
    pub default_code: &'static str,
    run: RunRecipe,
    compile: Option<CompileRecipe>,
}

impl LanguageProfile {
    fn interpreted(
        language: Language,
        display_name: &'static str,
        extension: &'static str,
        program: &str,
        default_code: &'static str,
    ) -> Self {
        Self {
            language,
            display_name,
            extension,
            default_code,
            run: RunRecipe::Interpreter {
                program: program.to_string(),
                args: Vec::new(),
            },
            compile: None,
        }
    }

    fn compiled(
        language: Language,
        display_name: &'static str,
        extension: &'static str,
        compiler: &str,
        flags: Vec<String>,
        default_code: &'static str,
    ) -> Self {
        Self {
            language,
            display_name,
            extension,
            default_code,
            run: RunRecipe::Artifact,
            compile: Some(CompileRecipe {
                program: compiler.to_string(),
                flags,
            }),
        }
    }

    pub fn has_compile_stage(&self) -> bool {
        self.compile.is_some()
    }

    /// Program used by the first stage (compiler or interpreter)
    pub fn toolchain_program(&self) -> Option<&str> {
        match (&self.compile, &self.run) {
            (Some(compile), _) => Some(&compile.program),
            (None, RunRecipe::Interpreter { program, .. }) => Some(program),
            (None, RunRecipe::Artifact) => None,
        }
    }

    /// `<compiler> <source> -o <artifact> <flags..>`, if this language compiles
    pub fn compile_command(&self, workspace: &Workspace) -> Option<StageCommand> {
        let recipe = self.compile.as_ref()?;
        let artifact = workspace.artifact_file()?;
        let mut command = StageCommand::new(&recipe.program)
            .arg(workspace.source_file().to_string_lossy())
            .arg("-o")
            .arg(artifact.to_string_lossy());
        command.args.extend(recipe.flags.iter().cloned());
        Some(command)
    }

    pub fn run_command(&self, workspace: &Workspace) -> ExecResult<StageCommand> {
        match &self.run {
            RunRecipe::Interpreter { program, args } => {
                let mut command = StageCommand::new(program);
                command.args.extend(args.iter().cloned());
                Ok(command.arg(workspace.source_file().to_string_lossy()))
            }
            RunRecipe::Artifact => workspace
                .artifact_file()
                .map(StageCommand::new)
                .ok_or_else(|| {
                    ExecError::Config(format!(
                        "{} profile runs an artifact but the workspace has none",
                        self.language
                    ))
                }),
        }
    }
}

const PYTHON_HELLO: &str = r#"# Python Code
def greet(name):
    return f"Hello, {name}!"

print(greet("World"))"#;

const JAVASCRIPT_HELLO: &str = r#"// JavaScript Code
function greet(name) {
    return `Hello, ${name}!`;
}

console.log(greet("World"));"#;

const CPP_HELLO: &str = r#"// C++ Code
#include <iostream>
using namespace std;

int main() {
    cout << "Hello, World!" << endl;
    return 0;
}"#;

/// Immutable set of language profiles, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: BTreeMap<Language, LanguageProfile>,
}

impl LanguageRegistry {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        let profiles = [
            LanguageProfile::interpreted(
                Language::Python,
                "Python",
                ".py",
                &toolchain.python,
                PYTHON_HELLO,
            ),
            LanguageProfile::interpreted(
                Language::JavaScript,
                "JavaScript",
                ".js",
                &toolchain.node,
                JAVASCRIPT_HELLO,
            ),
            LanguageProfile::compiled(
                Language::Cpp,
                "C++",
                ".cpp",
                &toolchain.cxx,
                toolchain.cxx_flags(),
                CPP_HELLO,
            ),
        ]
        .into_iter()
        .map(|profile| (profile.language, profile))
        .collect();

        Self { profiles }
    }

    /// Look up a profile by identifier or alias
    pub fn resolve(&self, id: &str) -> ExecResult<&LanguageProfile> {
        let language: Language = id.parse()?;
        self.get(language)
            .ok_or_else(|| ExecError::UnsupportedLanguage(id.to_string()))
    }

    pub fn get(&self, language: Language) -> Option<&LanguageProfile> {
        self.profiles.get(&language)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &LanguageProfile> {
        self.profiles.values()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new(&ToolchainConfig::default())
    }
}
