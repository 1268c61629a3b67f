//! Post bodies are stored gzip-compressed. Both store backends go through
//! these helpers so write and read always agree on the codec.
use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub async fn compress_text(text: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(text.as_bytes()).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

pub async fn decompress_text(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzipDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out).await?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips() {
        let body = "chapter one\n".repeat(500);
        let packed = compress_text(&body).await.unwrap();
        assert!(packed.len() < body.len());
        assert_eq!(decompress_text(&packed).await.unwrap(), body);
    }

    #[tokio::test]
    async fn rejects_garbage() {
        assert!(decompress_text(b"definitely not gzip").await.is_err());
    }
}
