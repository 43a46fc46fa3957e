//! # Guard Scripts
//!
//! A line-oriented program format executed in-process against the monitored
//! namespace and environment. Scripts exist to exercise the guard: they can
//! do everything a hostile dependency would do to the reference graph.
//!
//! ## Commands
//!
//! | Command | Effect |
//! |---------|--------|
//! | `sleep <ms>` | block the program thread |
//! | `print <text>` | write a line to stdout |
//! | `env set <key> <value>` / `env unset <key>` | mutate the environment |
//! | `hook push <id>` / `hook remove <id>` | append / drop an import hook |
//! | `hook insert <index> <id>` / `hook reverse` | reorder the hook chain |
//! | `replace <path> builtin <type>` | rebind to a new opaque callable |
//! | `replace <path> function <hex>` | rebind to a new function |
//! | `alias <path> <source>` | rebind to whatever `<source>` resolves to |
//! | `patch <path> <hex>` | swap a function's instructions in place |
//! | `delete <path>` | remove the attribute |
//! | `exit <code>` | stop; non-zero is a program failure |
//! | `fail <message>` | stop with a failure |
//!
//! Blank lines and lines starting with `#` are ignored. `$1`..`$9` expand
//! to program arguments, `$@` to all of them, `$$` to a literal `$`.
//!
//! ## Example
//!
//! ```text
//! # swap the socket class, then leave
//! print connecting to $1
//! replace net.Socket builtin type
//! sleep 50
//! exit 0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use patchtrap_monitor::ProgramFailure;
use patchtrap_registry::{Binding, CodeObject, Environment, Namespace, Resolver, TargetPath};

/// Errors reading or parsing a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("cannot read script {path}: {source}")]
    Io {
        /// Script path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        message: String,
    },
}

/// One script instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// `sleep <ms>`
    Sleep(Duration),
    /// `print <text>`
    Print(String),
    /// `env set <key> <value>`
    EnvSet {
        /// Variable name.
        key: String,
        /// New value.
        value: String,
    },
    /// `env unset <key>`
    EnvUnset(String),
    /// `hook push <id>`
    HookPush(String),
    /// `hook remove <id>`
    HookRemove(String),
    /// `hook insert <index> <id>`
    HookInsert {
        /// Position in the chain.
        index: usize,
        /// Hook id.
        id: String,
    },
    /// `hook reverse`
    HookReverse,
    /// `replace <path> builtin <type>`
    ReplaceBuiltin {
        /// Target.
        path: TargetPath,
        /// Type signature of the replacement.
        type_name: String,
    },
    /// `replace <path> function <hex>`
    ReplaceFunction {
        /// Target.
        path: TargetPath,
        /// Instructions of the replacement.
        instructions: Vec<u8>,
    },
    /// `alias <path> <source>`
    Alias {
        /// Target.
        path: TargetPath,
        /// Where the new binding comes from.
        source: TargetPath,
    },
    /// `patch <path> <hex>`
    Patch {
        /// Target function.
        path: TargetPath,
        /// New instructions.
        instructions: Vec<u8>,
    },
    /// `delete <path>`
    Delete(TargetPath),
    /// `exit <code>`
    Exit(i32),
    /// `fail <message>`
    Fail(String),
}

/// A parsed guard script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardScript {
    commands: Vec<(usize, ScriptCommand)>,
}

impl GuardScript {
    /// Reads and parses a script file.
    pub fn from_file(path: &Path, args: &[String]) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, args)
    }

    /// Parses script text, expanding argument references.
    pub fn parse(text: &str, args: &[String]) -> Result<Self, ScriptError> {
        let mut commands = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let expanded = expand_args(trimmed, args);
            let command =
                parse_command(&expanded).map_err(|message| ScriptError::Parse { line, message })?;
            commands.push((line, command));
        }
        Ok(Self { commands })
    }

    /// Parsed commands with their line numbers.
    pub fn commands(&self) -> impl Iterator<Item = (usize, &ScriptCommand)> {
        self.commands.iter().map(|(line, cmd)| (*line, cmd))
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the script has no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs the script to completion.
    ///
    /// # Errors
    ///
    /// A non-zero `exit`, a `fail`, or a command that cannot be applied.
    pub fn execute(&self, ns: &Namespace, env: &dyn Environment) -> Result<(), ProgramFailure> {
        for (line, command) in &self.commands {
            debug!(line, command = ?command, "Script command");
            match apply(command, ns, env) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(0)) => return Ok(()),
                Ok(Flow::Exit(code)) => return Err(ProgramFailure::exit(code)),
                Err(message) => {
                    return Err(ProgramFailure::new(format!("line {}: {}", line, message)))
                }
            }
        }
        Ok(())
    }
}

enum Flow {
    Continue,
    Exit(i32),
}

fn apply(command: &ScriptCommand, ns: &Namespace, env: &dyn Environment) -> Result<Flow, String> {
    match command {
        ScriptCommand::Sleep(duration) => std::thread::sleep(*duration),
        ScriptCommand::Print(text) => println!("{}", text),
        ScriptCommand::EnvSet { key, value } => env.set(key, value),
        ScriptCommand::EnvUnset(key) => env.remove(key),
        ScriptCommand::HookPush(id) => ns.push_hook(id.clone()),
        ScriptCommand::HookRemove(id) => {
            if !ns.remove_hook(id) {
                return Err(format!("no import hook '{}'", id));
            }
        }
        ScriptCommand::HookInsert { index, id } => ns.insert_hook(*index, id.clone()),
        ScriptCommand::HookReverse => ns.reverse_hooks(),
        ScriptCommand::ReplaceBuiltin { path, type_name } => {
            let replacement = Binding::builtin(replacement_name(path), type_name.clone());
            ns.rebind(path, replacement).map_err(|e| e.to_string())?;
        }
        ScriptCommand::ReplaceFunction { path, instructions } => {
            let replacement =
                Binding::function(replacement_name(path), CodeObject::new(instructions.clone()));
            ns.rebind(path, replacement).map_err(|e| e.to_string())?;
        }
        ScriptCommand::Alias { path, source } => {
            let binding = ns.resolve(source).map_err(|e| e.to_string())?;
            ns.rebind(path, binding).map_err(|e| e.to_string())?;
        }
        ScriptCommand::Patch { path, instructions } => {
            match ns.resolve(path).map_err(|e| e.to_string())? {
                Binding::Function(def) => {
                    let mut code = def.code();
                    code.instructions = instructions.clone();
                    def.replace_code(code);
                }
                other => return Err(format!("{} is {}, not a function", path, other)),
            }
        }
        ScriptCommand::Delete(path) => {
            ns.delete(path).map_err(|e| e.to_string())?;
        }
        ScriptCommand::Exit(code) => return Ok(Flow::Exit(*code)),
        ScriptCommand::Fail(message) => return Err(message.clone()),
    }
    Ok(Flow::Continue)
}

fn replacement_name(path: &TargetPath) -> String {
    format!("guard_script.{}", path.attribute())
}

/// Splits off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn parse_path(raw: &str) -> Result<TargetPath, String> {
    if raw.is_empty() {
        return Err("missing target path".to_string());
    }
    raw.parse().map_err(|e| format!("{}", e))
}

fn parse_hex(raw: &str) -> Result<Vec<u8>, String> {
    hex::decode(raw).map_err(|e| format!("invalid hex '{}': {}", raw, e))
}

fn single_word<'a>(rest: &'a str, what: &str) -> Result<&'a str, String> {
    let (word, tail) = split_word(rest);
    if word.is_empty() {
        return Err(format!("missing {}", what));
    }
    if !tail.is_empty() {
        return Err(format!("unexpected text after {}: '{}'", what, tail));
    }
    Ok(word)
}

fn parse_command(line: &str) -> Result<ScriptCommand, String> {
    let (verb, rest) = split_word(line);
    let command = match verb {
        "sleep" => {
            let ms = single_word(rest, "duration")?;
            let ms: u64 = ms
                .parse()
                .map_err(|_| format!("invalid duration '{}'", ms))?;
            ScriptCommand::Sleep(Duration::from_millis(ms))
        }
        "print" => ScriptCommand::Print(rest.to_string()),
        "env" => {
            let (action, rest) = split_word(rest);
            match action {
                "set" => {
                    let (key, value) = split_word(rest);
                    if key.is_empty() {
                        return Err("missing variable name".to_string());
                    }
                    ScriptCommand::EnvSet {
                        key: key.to_string(),
                        value: value.to_string(),
                    }
                }
                "unset" => ScriptCommand::EnvUnset(single_word(rest, "variable name")?.to_string()),
                other => return Err(format!("unknown env action '{}'", other)),
            }
        }
        "hook" => {
            let (action, rest) = split_word(rest);
            match action {
                "push" => ScriptCommand::HookPush(single_word(rest, "hook id")?.to_string()),
                "remove" => ScriptCommand::HookRemove(single_word(rest, "hook id")?.to_string()),
                "insert" => {
                    let (index, rest) = split_word(rest);
                    let index = index
                        .parse()
                        .map_err(|_| format!("invalid hook index '{}'", index))?;
                    ScriptCommand::HookInsert {
                        index,
                        id: single_word(rest, "hook id")?.to_string(),
                    }
                }
                "reverse" if rest.is_empty() => ScriptCommand::HookReverse,
                other => return Err(format!("unknown hook action '{}'", other)),
            }
        }
        "replace" => {
            let (path, rest) = split_word(rest);
            let path = parse_path(path)?;
            let (kind, rest) = split_word(rest);
            match kind {
                "builtin" => ScriptCommand::ReplaceBuiltin {
                    path,
                    type_name: single_word(rest, "type name")?.to_string(),
                },
                "function" => ScriptCommand::ReplaceFunction {
                    path,
                    instructions: parse_hex(single_word(rest, "instructions")?)?,
                },
                other => return Err(format!("unknown replacement kind '{}'", other)),
            }
        }
        "alias" => {
            let (path, rest) = split_word(rest);
            ScriptCommand::Alias {
                path: parse_path(path)?,
                source: parse_path(single_word(rest, "source path")?)?,
            }
        }
        "patch" => {
            let (path, rest) = split_word(rest);
            ScriptCommand::Patch {
                path: parse_path(path)?,
                instructions: parse_hex(single_word(rest, "instructions")?)?,
            }
        }
        "delete" => ScriptCommand::Delete(parse_path(single_word(rest, "target path")?)?),
        "exit" => {
            let code = single_word(rest, "exit code")?;
            ScriptCommand::Exit(
                code.parse()
                    .map_err(|_| format!("invalid exit code '{}'", code))?,
            )
        }
        "fail" => ScriptCommand::Fail(if rest.is_empty() {
            "guard script failed".to_string()
        } else {
            rest.to_string()
        }),
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(command)
}

fn expand_args(line: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('@') => {
                chars.next();
                out.push_str(&args.join(" "));
            }
            Some(d @ '1'..='9') => {
                chars.next();
                let index = (d as usize) - ('1' as usize);
                if let Some(arg) = args.get(index) {
                    out.push_str(arg);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}
