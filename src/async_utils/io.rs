//! Output helpers.
//!
//! Everything we write is small enough to render in memory first, so this
//! just picks between a file and standard output.

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write `data` to either standard output or a file.
pub async fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    writer
        .write_all(data)
        .await
        .context("Failed to write output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write a sequence of values as JSON Lines.
pub async fn write_jsonl<T: Serialize>(path: Option<&Path>, values: &[T]) -> Result<()> {
    let mut out = Vec::new();
    for value in values {
        serde_json::to_writer(&mut out, value).context("Failed to serialize JSON")?;
        out.push(b'\n');
    }
    write_output(path, &out).await
}
