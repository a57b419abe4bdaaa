//! Shell command module.
//!
//! Runs a command line through a shell (`/bin/bash` by default), capturing
//! stdout, stderr, and the exit code. A non-zero exit is a `fail` result
//! carrying all three. On POSIX, `user` drops privileges to the named
//! account before exec; other platforms reject the argument.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::info;

use cascade_core::error::{EngineError, Result};
use cascade_core::modules::{CallContext, WorkflowModule};
use cascade_core::result::StepResult;

pub const MODULE_NAME: &str = "command_module";

const DEFAULT_SHELL: &str = "/bin/bash";

/// Static instance config from `context_modules`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub shell: Option<String>,
    pub cwd: Option<String>,
    /// Extra environment applied to every command from this instance
    pub env: Option<HashMap<String, String>>,
}

pub struct CommandModule {
    config: CommandConfig,
}

#[derive(Debug, Deserialize)]
struct RunArgs {
    command: String,
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
}

impl CommandModule {
    pub fn from_config(config: &Value) -> Result<Self> {
        let config: CommandConfig = if config.is_null() {
            CommandConfig::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        Ok(Self { config })
    }

    async fn run(&self, args: RunArgs) -> Result<StepResult> {
        let shell = args
            .shell
            .or_else(|| self.config.shell.clone())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());
        info!(shell = %shell, command = %args.command, "running command");

        let mut command = Command::new(&shell);
        command.arg("-c").arg(&args.command);
        if let Some(cwd) = args.cwd.as_deref().or(self.config.cwd.as_deref()) {
            command.current_dir(cwd);
        }
        for env in [self.config.env.as_ref(), args.env.as_ref()].into_iter().flatten() {
            command.envs(env);
        }
        if let Some(user) = &args.user {
            match apply_user(&mut command, user) {
                Ok(()) => {}
                Err(err) => return Ok(StepResult::fail(err.to_string())),
            }
        }

        let output = match command.output().await {
            Ok(output) => output,
            Err(err) => {
                return Ok(StepResult::fail(format!("Unhandled exception: {}", err)));
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        info!(exit_code, "command completed");

        if !output.status.success() {
            return Ok(StepResult::fail_with_data(
                format!("Command failed: {}", stderr),
                json!({
                    "stdout": stdout,
                    "stderr": stderr,
                    "exit_code": exit_code,
                }),
            ));
        }
        Ok(StepResult::ok(
            "Command executed successfully",
            json!({
                "stdout": stdout,
                "exit_code": exit_code,
            }),
        ))
    }
}

/// Drops the child's credentials to `user` before exec. `user` may be an
/// account name resolved through the passwd database or a numeric uid
/// (gid defaults to the uid in the numeric case).
#[cfg(unix)]
fn apply_user(command: &mut Command, user: &str) -> Result<()> {
    let (uid, gid) = if let Ok(uid) = user.parse::<u32>() {
        (uid, uid)
    } else {
        lookup_passwd(user).ok_or_else(|| {
            EngineError::resolution(user.to_string(), "no such user in the passwd database")
        })?
    };
    command.uid(uid).gid(gid);
    Ok(())
}

#[cfg(not(unix))]
fn apply_user(_command: &mut Command, _user: &str) -> Result<()> {
    Err(EngineError::validation(
        "running a command as another user is only supported on POSIX",
    ))
}

#[cfg(unix)]
fn lookup_passwd(name: &str) -> Option<(u32, u32)> {
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let mut fields = line.split(':');
        if fields.next() != Some(name) {
            continue;
        }
        let _password = fields.next()?;
        let uid = fields.next()?.parse().ok()?;
        let gid = fields.next()?.parse().ok()?;
        return Some((uid, gid));
    }
    None
}

#[async_trait]
impl WorkflowModule for CommandModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn invoke(
        &self,
        method: &str,
        args: &Map<String, Value>,
        _call: &CallContext,
    ) -> Result<StepResult> {
        match method {
            "run" => self.run(serde_json::from_value(Value::Object(args.clone()))?).await,
            other => Err(EngineError::Dispatch {
                target: format!("{}.{}", MODULE_NAME, other),
                message: "method not implemented".to_string(),
            }),
        }
    }
}
