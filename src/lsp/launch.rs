//! Command line for starting BSL Language Server.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{BslSettings, find_project_config};
use crate::deps::RuntimeDependencies;

/// How to start the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// The `java` executable.
    pub program: PathBuf,
    /// Arguments passed to `java`.
    pub args: Vec<OsString>,
    /// Value of `JAVA_HOME` for the child process.
    pub java_home: PathBuf,
    /// Working directory, the workspace root.
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// Builds `java -Xmx<mem> [flags] -jar <jar> [--configuration <file>]`.
    ///
    /// `--configuration` is only passed when the workspace has a
    /// `.bsl-language-server.json` file.
    pub fn new(deps: &RuntimeDependencies, settings: &BslSettings, workspace_root: &Path) -> Self {
        let mut args: Vec<OsString> = Vec::new();
        args.push(format!("-Xmx{}", settings.resolve_memory()).into());
        args.extend(settings.extra_jvm_options().into_iter().map(OsString::from));
        args.push("-jar".into());
        args.push(deps.jar_path.clone().into_os_string());

        if let Some(config) = find_project_config(workspace_root) {
            args.push("--configuration".into());
            args.push(config.into_os_string());
        }

        Self {
            program: deps.java_path.clone(),
            args,
            java_home: deps.java_home.clone(),
            cwd: workspace_root.to_path_buf(),
        }
    }

    /// The command line as a single string, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
