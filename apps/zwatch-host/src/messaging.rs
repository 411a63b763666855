use anyhow::{Context, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use zwatch_shared::protocol::{CheckRequest, CheckResponse, UNKNOWN_ISSUER};

use crate::inspector::IssuerInspector;

/// Issuer substring that marks a re-signing middlebox.
const INTERCEPT_SIGNATURE: &str = "zscaler";

pub fn is_intercept_issuer(issuer: &str) -> bool {
    issuer.to_lowercase().contains(INTERCEPT_SIGNATURE)
}

/// Reads one length-prefixed frame. `Ok(None)` is a clean end-of-stream at
/// a frame boundary; end-of-stream anywhere inside a frame is an error.
pub async fn read_frame<R>(input: &mut R) -> anyhow::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = input
            .read(&mut prefix[filled..])
            .await
            .context("failed to read frame length")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("input closed inside a frame length prefix");
        }
        filled += n;
    }

    // The browser writes the length in native byte order.
    let len = u32::from_ne_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    input
        .read_exact(&mut payload)
        .await
        .context("input closed inside a frame payload")?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(output: &mut W, payload: &[u8]) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).context("response does not fit in a frame")?;
    output.write_all(&len.to_ne_bytes()).await?;
    output.write_all(payload).await?;
    output.flush().await?;
    Ok(())
}

/// Builds the response for one request. Absent or empty hostnames are
/// rejected without touching the network; everything else gets a verdict,
/// with [`UNKNOWN_ISSUER`] standing in when inspection came up empty.
pub async fn handle_request(inspector: &IssuerInspector, hostname: Option<&str>) -> CheckResponse {
    let Some(hostname) = hostname.filter(|h| !h.is_empty()) else {
        return CheckResponse::rejected("No hostname provided");
    };

    debug!("checking {}", hostname);
    match inspector.inspect(hostname).await {
        Some(issuer) => {
            let intercepted = is_intercept_issuer(&issuer);
            CheckResponse::verdict(intercepted, issuer)
        }
        None => CheckResponse::verdict(false, UNKNOWN_ISSUER),
    }
}

/// Request/response loop: one frame in, one inspection, one frame out,
/// until the input side closes. Requests are handled strictly one at a
/// time; any framing or channel error aborts the loop.
pub async fn run<R, W>(
    input: &mut R,
    output: &mut W,
    inspector: &IssuerInspector,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = read_frame(input).await? {
        let request: CheckRequest =
            serde_json::from_slice(&payload).context("malformed request frame")?;

        let response = handle_request(inspector, request.hostname.as_deref()).await;
        let body = serde_json::to_vec(&response)?;
        write_frame(output, &body).await?;
    }
    Ok(())
}
