use std::{fs, path::PathBuf};

/// Exit status used when interrupted, 128 + SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Installs a SIGINT/SIGTERM handler that removes the scratch directory and
/// exits.
///
/// Ctrl-C in a terminal signals the whole foreground process group, so
/// `vagrant` and `helm` children stop too. A SIGTERM sent to this process
/// alone does not reach them, and `process::exit` skips `kill_on_drop`, so
/// they keep running until they finish on their own.
pub fn remove_on_interrupt(tmp_dir: PathBuf) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, cleaning up {}", tmp_dir.display());
        _ = fs::remove_dir_all(&tmp_dir);
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })?;

    Ok(())
}
