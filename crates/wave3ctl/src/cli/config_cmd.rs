//! `config` subcommand — show effective configuration and file paths, or
//! write a defaults file with `--init`.

use std::path::Path;

use super::{
    Config, ConfigInitOutput, ConfigOutput, Ctx, Result, Wave3Error, kv, kv_indent, kv_width,
    print_json,
};

fn or_disabled(cmd: &str) -> &str {
    if cmd.trim().is_empty() { "(disabled)" } else { cmd }
}

pub(super) fn cmd_config(ctx: &Ctx) -> Result<()> {
    let config = &ctx.config;
    let config_path = ctx.config_path.clone().or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if ctx.json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config.clone(),
            problems,
        });
    }

    let w = kv_width(
        &["Config file:", "Socket in use:"],
        &[
            "socket_path:",
            "socket_mode:",
            "device:",
            "timeout_ms:",
            "serialize_transfers:",
            "poll_interval_ms:",
            "on_mute_command:",
            "on_unmute_command:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    kv("Socket in use:", ctx.socket.display(), w);
    println!();

    println!("Settings:");
    kv_indent("socket_path:", config.socket_path.display(), w);
    kv_indent("socket_mode:", format_args!("{:#o}", config.socket_mode), w);
    kv_indent("device:", config.device_id(), w);
    kv_indent("timeout_ms:", config.timeout_ms, w);
    kv_indent("serialize_transfers:", config.serialize_transfers, w);
    kv_indent("poll_interval_ms:", config.poll_interval_ms, w);
    kv_indent("on_mute_command:", or_disabled(&config.on_mute_command), w);
    kv_indent("on_unmute_command:", or_disabled(&config.on_unmute_command), w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}

/// Write `Config::default()` to `path`; an existing file is kept unless `force`.
fn write_defaults(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Wave3Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save_to(path)?;
    Ok(())
}

pub(super) fn cmd_config_init(ctx: &Ctx, force: bool) -> Result<()> {
    let path = ctx
        .config_path
        .clone()
        .or_else(Config::path)
        .ok_or_else(|| Wave3Error::Config("No config directory".into()))?;
    write_defaults(&path, force)?;
    log::info!("wrote default config to {}", path.display());

    if ctx.json {
        return print_json(&ConfigInitOutput {
            config_file: path.display().to_string(),
            written: true,
        });
    }
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_defaults(&path, false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# wave3ctl configuration"));
        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn init_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_ms = 250\n").unwrap();

        let err = write_defaults(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(Config::load_from(&path).0.timeout_ms, 250);

        write_defaults(&path, true).unwrap();
        assert_eq!(Config::load_from(&path).0, Config::default());
    }
}
