use anyhow::anyhow;
use jsonrpsee::core::RpcResult;
use std::fmt::Display;
use std::path::Path;

pub trait IntoAnyhow<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E> IntoAnyhow<T> for Result<T, E>
where
    E: Display,
{
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow!(e.to_string()))
    }
}

/// Convert any displayable error into a jsonrpc error
pub trait IntoJsonRpcResult<T> {
    fn internal_call_error(self) -> RpcResult<T>;
    fn invalid_params(self) -> RpcResult<T>;
}

impl<T, E> IntoJsonRpcResult<T> for Result<T, E>
where
    E: Display,
{
    fn internal_call_error(self) -> RpcResult<T> {
        self.map_err(|e| jsonrpsee::core::Error::Custom(e.to_string()))
    }

    fn invalid_params(self) -> RpcResult<T> {
        self.map_err(|e| jsonrpsee::core::Error::Custom(format!("invalid params: {}", e)))
    }
}

/// sqlx refuses to open a sqlite file that does not exist, create an empty one first
pub async fn ensure_db_file(dsn: &str) -> anyhow::Result<()> {
    let path = match dsn.strip_prefix("sqlite://") {
        Some(rest) => rest.split('?').next().unwrap_or(rest),
        None => return Ok(()),
    };
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    let path = Path::new(path);
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(path).await?;
    }
    Ok(())
}

/// Lower case 0x prefixed hex
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", ethers::utils::hex::encode(bytes.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_prefixed() {
        assert_eq!(to_hex([0u8, 0xab, 0x10]), "0x00ab10");
        assert_eq!(to_hex(Vec::<u8>::new()), "0x");
    }

    #[tokio::test]
    async fn memory_dsn_does_not_touch_filesystem() {
        ensure_db_file("sqlite::memory:").await.unwrap();
        ensure_db_file("mysql://root@localhost/relay").await.unwrap();
    }
}
