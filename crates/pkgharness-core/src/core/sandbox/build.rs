use std::{fs, path::Path};

use anyhow::Context;
use tracing::info;

use super::{
    errors::ProvisioningFailure, layout::SandboxLayout, provision::Provisioner, ProvisionVariant,
    Sandbox,
};
use crate::core::{
    config::HarnessConfig,
    errors::HarnessError,
    fs::remove_dir_all_writable,
    runner::{run, RunOptions},
};

const PTH_FILE: &str = "easy-install.pth";

/// Builds a sandbox for `variant` at `root` from nothing.
pub(crate) fn build_sandbox(
    provisioner: &dyn Provisioner,
    variant: &ProvisionVariant,
    root: &Path,
    config: &HarnessConfig,
    download_cache: &Path,
) -> Result<Sandbox, ProvisioningFailure> {
    info!(variant = variant.tag(), root = %root.display(), "building sandbox");
    remove_dir_all_writable(root).map_err(|err| ProvisioningFailure::step("clear root", err))?;
    let tool_root = SandboxLayout::default_tool_root(root);
    for dir in [tool_root.clone(), root.join("scratch")] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))
            .map_err(|err| ProvisioningFailure::step("create root", err))?;
    }

    let paths = provisioner
        .provision(&tool_root, variant)
        .map_err(|err| ProvisioningFailure::step("provision", err))?;
    let layout = SandboxLayout::new(root, &paths)?;

    let create_user_site = || -> anyhow::Result<()> {
        let user_site = layout.user_site_path();
        fs::create_dir_all(&user_site)
            .with_context(|| format!("failed to create {}", user_site.display()))?;
        fs::write(user_site.join(PTH_FILE), b"")
            .with_context(|| format!("failed to write {PTH_FILE}"))?;
        fs::create_dir_all(layout.temp_path()).context("failed to create temp dir")?;
        Ok(())
    };
    create_user_site().map_err(|err| ProvisioningFailure::step("user site", err))?;

    let sandbox = Sandbox::new(*variant, layout, config, download_cache)?;
    verify_interpreter(&sandbox)?;

    let setup = RunOptions::new().expect_stderr().allow_temp_files();
    for &package in variant.baseline_packages() {
        info!(package, "installing baseline package");
        run(&sandbox, "python", ["-m", "pip", "install", package], &setup)
            .map_err(|err| step("baseline packages", err))?;
    }

    if let Some(source) = &config.tool.source_dir {
        install_tool_from_source(&sandbox, source, &setup)?;
    }
    info!(variant = variant.tag(), "sandbox built");
    Ok(sandbox)
}

fn step(step: &'static str, err: HarnessError) -> ProvisioningFailure {
    ProvisioningFailure::step(step, anyhow::Error::new(err))
}

/// `python` on the sandbox `PATH` must be the sandbox's own interpreter.
fn verify_interpreter(sandbox: &Sandbox) -> Result<(), ProvisioningFailure> {
    let result = run(
        sandbox,
        "python",
        ["-c", pkgharness_python::executable_probe()],
        &RunOptions::new().allow_temp_files(),
    )
    .map_err(|err| step("interpreter check", err))?;
    let found = result.stdout().trim();
    let expected = sandbox.layout().interpreter_path();
    if pkgharness_python::executable_matches(Path::new(found), &expected) {
        return Ok(());
    }
    Err(ProvisioningFailure::InterpreterEscaped {
        found: found.to_string(),
        expected: expected.display().to_string(),
    })
}

/// Python one-liner that runs the tool's module from `source` as `__main__`,
/// so the checkout rather than the installed copy does the work.
fn bootstrap_script(source: &Path, module: &str) -> Result<String, ProvisioningFailure> {
    let literal = |value: &str| {
        serde_json::to_string(value)
            .map_err(|err| ProvisioningFailure::step("bootstrap script", anyhow::Error::new(err)))
    };
    let source = source.display().to_string();
    Ok(format!(
        "import runpy, sys; sys.path.insert(0, {}); runpy.run_module({}, run_name='__main__', alter_sys=True)",
        literal(&source)?,
        literal(module)?,
    ))
}

fn install_tool_from_source(
    sandbox: &Sandbox,
    source: &Path,
    setup: &RunOptions,
) -> Result<(), ProvisioningFailure> {
    let tool = sandbox.tool();
    let bootstrap = bootstrap_script(source, &tool.module)?;
    info!(tool = %tool.name, source = %source.display(), "installing tool from source");
    run(
        sandbox,
        "python",
        ["-c", bootstrap.as_str(), "uninstall", "-y", tool.name.as_str()],
        setup,
    )
    .map_err(|err| step("uninstall bundled tool", err))?;

    if source.join("setup.py").is_file() {
        run(
            sandbox,
            "python",
            ["setup.py", "install"],
            &setup.clone().cwd(source),
        )
        .map_err(|err| step("install tool from source", err))?;
    } else {
        let source = source.display().to_string();
        run(
            sandbox,
            "python",
            ["-c", bootstrap.as_str(), "install", source.as_str()],
            setup,
        )
        .map_err(|err| step("install tool from source", err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_script_quotes_paths() {
        let script = bootstrap_script(Path::new("/src/it's \"here\""), "pip").expect("script");
        assert!(script.contains(r#"sys.path.insert(0, "/src/it's \"here\"")"#));
        assert!(script.contains(r#"runpy.run_module("pip", run_name='__main__'"#));
    }
}
