use anyhow::{Context, Result};
use glob::glob;
use stockscraper::{
    config::Config,
    secure::{Vault, ENCRYPTED_DIR, ENCRYPTED_SUFFIX},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Decrypt every `<OUTPUT_DIR>/encrypted/*.enc` into `<OUTPUT_DIR>/decrypted/`.
fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cfg = Config::load()?;
    let key = cfg
        .encryption_key
        .as_ref()
        .context("ENCRYPTION_KEY is not set; encrypted files cannot be restored")?;
    let vault = Vault::new(key)?;

    let pattern = format!(
        "{}/{}/*{}",
        cfg.output_dir.display(),
        ENCRYPTED_DIR,
        ENCRYPTED_SUFFIX
    );
    let (mut restored, mut failed) = (0usize, 0usize);
    for entry in glob(&pattern).context("invalid glob pattern for encrypted files")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot read glob entry: {:?}", e);
                continue;
            }
        };
        match vault.restore(&path)? {
            Some(_) => restored += 1,
            None => failed += 1,
        }
    }

    info!(restored, failed, "restore finished");
    Ok(())
}
