/// Run a job under a process sampler and write the run window next to the samples.
///
/// The sampler is a shell loop that appends a `#<epoch>` marker and a `ps` listing to ps.log at a
/// fixed interval, for as long as the job runs.  It is killed when the job exits and not waited
/// for, so the last listing in ps.log may be incomplete.
use crate::RecordCmdArgs;

use anyhow::{bail, Context, Result};
use benchlog::RunMeta;
use std::fs;
use std::path::Path;
use subprocess::{Exec, ExitStatus, NullFile, Popen};

pub fn record(args: &RecordCmdArgs) -> Result<()> {
    fs::create_dir_all(&args.results_dir)
        .with_context(|| format!("Creating {}", args.results_dir.display()))?;

    let pslog = args.results_dir.join("ps.log");
    let mut sampler = start_sampler(&pslog, args.interval)?;
    log::info!("Sampling processes to {}", pslog.display());

    let command = args.command.join(" ");
    let start = now();
    let status = Exec::shell(&command).join();
    let stop = now();

    if let Err(e) = sampler.kill() {
        log::warn!("Could not stop the process sampler: {e}");
    }
    sampler.detach();

    let meta = RunMeta {
        start,
        stop,
        forks: args.forks,
        hosts: args.hosts,
        time: Some(stop.to_string()),
    };
    let metafile = write_meta(&args.results_dir, &meta)?;
    log::info!("Wrote {}", metafile);

    match status {
        Ok(ExitStatus::Exited(0)) => Ok(()),
        Ok(status) => bail!("Command '{command}' failed: {:?}", status),
        Err(e) => bail!("Could not run '{command}': {e}"),
    }
}

fn start_sampler(pslog: &Path, interval_ms: u64) -> Result<Popen> {
    let cmd = sampler_command(pslog, interval_ms);
    match Exec::shell(&cmd)
        .stdout(NullFile)
        .stderr(NullFile)
        .popen()
    {
        Ok(p) => Ok(p),
        Err(e) => bail!("Could not start the process sampler: {e}"),
    }
}

fn sampler_command(pslog: &Path, interval_ms: u64) -> String {
    let pslog = shell_quote(&pslog.display().to_string());
    let pause = interval_ms as f64 / 1000.0;
    format!(
        "while true; do echo \"#$(date +%s.%3N)\" >> {pslog}; ps xao pid,ppid,pgid,sid,%cpu,%mem,cmd -w 512 >> {pslog}; sleep {pause}; done"
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Write `<stop>_meta.json` and return its name.

pub fn write_meta(dir: &Path, meta: &RunMeta) -> Result<String> {
    let name = format!("{}_meta.json", meta.time.as_deref().unwrap_or("0"));
    let text = serde_json::to_string_pretty(meta)?;
    fs::write(dir.join(&name), text).with_context(|| format!("Writing {name}"))?;
    Ok(name)
}

#[test]
fn test_sampler_command() {
    let cmd = sampler_command(Path::new("/tmp/it's/ps.log"), 100);
    assert!(cmd.starts_with("while true; do echo \"#$(date +%s.%3N)\" >> '/tmp/it'\\''s/ps.log';"));
    assert!(cmd.contains("; sleep 0.1; done"));
}

#[test]
fn test_write_meta() {
    let dir = tempfile::tempdir().unwrap();
    let meta = RunMeta {
        start: 1549901580.0,
        stop: 1549901600.25,
        forks: Some(20),
        hosts: None,
        time: Some("1549901600.25".to_string()),
    };
    let name = write_meta(dir.path(), &meta).unwrap();
    assert!(name == "1549901600.25_meta.json");
    let text = fs::read_to_string(dir.path().join(&name)).unwrap();
    assert!(benchlog::parse_run_meta(&text).unwrap() == meta);
}
