use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};

use crate::anilist::AUTHORIZE_URL;

pub async fn run(config: Option<&str>) -> anyhow::Result<()> {
    let path = crate::config::config_path(config)?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "Open the following URL in your browser and paste in the token\n{AUTHORIZE_URL}\n> "
            )
            .as_bytes(),
        )
        .await
        .context("write prompt")?;
    stdout.flush().await.context("flush prompt")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("read token from stdin")?;
    let token = line.trim();
    if token.is_empty() {
        anyhow::bail!("no token entered");
    }

    crate::config::store_token(&path, token)?;
    tracing::debug!(path = %path.display(), "stored token");
    stdout.write_all(b"Saved\n").await.context("write output")?;
    stdout.flush().await.context("flush output")?;
    Ok(())
}
