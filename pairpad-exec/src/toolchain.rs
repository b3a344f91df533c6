//! Language runtimes and source materialization.
//!
//! Each run writes its source into the room's work dir and is launched with
//! a cleared environment: only `PATH`, `HOME` (the work dir) and the
//! runtime's own flags are passed through.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::language::Language;
use crate::manager::ExecError;

/// An executable plus the arguments placed before the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
}

impl Interpreter {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Host executables used to run each language.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub python: Interpreter,
    pub node: Interpreter,
    /// TypeScript → JavaScript transpiler. Invoked as `program args main.ts`
    /// and expected to write `main.js` next to it.
    pub transpiler: Interpreter,
    /// `PATH` handed to child processes
    pub path: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            python: Interpreter::new("python3", &["-u"]),
            node: Interpreter::new("node", &[]),
            transpiler: Interpreter::new(
                "tsc",
                &[
                    "--noCheck",
                    "--skipLibCheck",
                    "--target",
                    "es2020",
                    "--module",
                    "commonjs",
                ],
            ),
            path: std::env::var("PATH")
                .unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string()),
        }
    }
}

/// A fully prepared process invocation.
#[derive(Debug, Clone)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Launch {
    fn new(interpreter: &Interpreter, file: &str, env: &[(&str, &str)]) -> Self {
        let mut args = interpreter.args.clone();
        args.push(file.to_string());
        Self {
            program: interpreter.program.clone(),
            args,
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Command line as echoed to the terminal.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the child process: cleared env, no stdin, piped output.
    pub fn command(&self, work_dir: &Path, path: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(work_dir)
            .env_clear()
            .env("PATH", path)
            .env("HOME", work_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

const PYTHON_ENV: &[(&str, &str)] = &[("PYTHONUNBUFFERED", "1"), ("PYTHONIOENCODING", "utf-8")];
const NODE_ENV: &[(&str, &str)] = &[("NODE_NO_WARNINGS", "1")];

impl Toolchain {
    /// Write `code` into `work_dir` and return how to run it.
    ///
    /// TypeScript keeps `main.ts` on disk and runs the emitted `main.js`.
    pub async fn prepare(
        &self,
        language: Language,
        code: &str,
        work_dir: &Path,
        transpile_timeout: Duration,
    ) -> Result<Launch, ExecError> {
        let source = work_dir.join(language.source_file());
        tokio::fs::write(&source, code)
            .await
            .map_err(|e| ExecError::Materialize(e.to_string()))?;

        match language {
            Language::Python => Ok(Launch::new(&self.python, "main.py", PYTHON_ENV)),
            Language::JavaScript => Ok(Launch::new(&self.node, "main.js", NODE_ENV)),
            Language::TypeScript => {
                self.transpile(work_dir, transpile_timeout).await?;
                Ok(Launch::new(&self.node, "main.js", NODE_ENV))
            }
        }
    }

    async fn transpile(&self, work_dir: &Path, timeout: Duration) -> Result<(), ExecError> {
        let emitted = work_dir.join("main.js");
        match tokio::fs::remove_file(&emitted).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ExecError::Materialize(e.to_string())),
        }

        let launch = Launch::new(&self.transpiler, "main.ts", &[]);
        let child = launch
            .command(work_dir, &self.path)
            .spawn()
            .map_err(|e| ExecError::Transpile(format!("{}: {e}", self.transpiler.program)))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecError::Transpile(e.to_string())),
            Err(_) => return Err(ExecError::Transpile("transpiler timed out".to_string())),
        };

        // Type errors do not block emit; only a missing output file does
        if tokio::fs::try_exists(&emitted).await.unwrap_or(false) {
            if !output.status.success() {
                log::debug!("Transpiler exited with {} but emitted main.js", output.status);
            }
            Ok(())
        } else {
            let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
            diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(ExecError::Transpile(diagnostics.trim().to_string()))
        }
    }
}
