//! Config CLI command.

use super::write_err;
use crate::Result;
use crate::config::AppConfig;
use std::io::Write;

/// Prints the effective configuration as TOML with secrets redacted.
pub(super) fn show(config: &AppConfig, out: &mut dyn Write) -> Result<()> {
    let rendered = config.to_redacted_toml()?;
    out.write_all(rendered.as_bytes()).map_err(write_err)?;
    if let Err(e) = config.validate() {
        writeln!(out, "# warning: {e}").map_err(write_err)?;
    }
    Ok(())
}
