use std::error::Error;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_glacier::config::Region;
use aws_sdk_glacier::error::DisplayErrorContext;
use aws_sdk_glacier::primitives::ByteStream;
use aws_sdk_glacier::Client;
use bytes::Bytes;
use log::debug;
use tokio::runtime::Runtime;

use crate::{ArchiveReceipt, ByteRange, Remote, RemoteError};

// `-` means the account the credentials belong to
pub const DEFAULT_ACCOUNT: &str = "-";

pub struct GlacierConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub account_id: String,

    // Applies per request attempt, there is no timeout on the whole upload
    pub timeout: Duration,
}

pub struct Glacier {
    client: Client,
    account_id: String,

    // Runtime for the tokio reactor
    rt: Runtime,
}

impl Glacier {
    pub fn new(config: GlacierConfig) -> Result<Self, RemoteError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let client = rt.block_on(connect(&config));

        Ok(Glacier {
            client,
            account_id: config.account_id,
            rt,
        })
    }
}

impl Remote for Glacier {
    fn begin_session(
        &self,
        vault: &str,
        description: Option<&str>,
        part_size: usize,
    ) -> Result<String, RemoteError> {
        let call = self
            .client
            .initiate_multipart_upload()
            .account_id(&self.account_id)
            .vault_name(vault)
            .set_archive_description(description.map(str::to_string))
            .part_size(part_size.to_string())
            .send();

        let res = self.rt.block_on(call).map_err(rejected)?;
        let upload_id = res
            .upload_id()
            .ok_or_else(|| RemoteError::Rejected("no upload id in response".to_string()))?;

        debug!("location: {:?}", res.location());
        Ok(upload_id.to_string())
    }

    fn submit_part(
        &self,
        upload_id: &str,
        vault: &str,
        range: &ByteRange,
        body: &[u8],
        checksum: &str,
    ) -> Result<(), RemoteError> {
        let call = self
            .client
            .upload_multipart_part()
            .account_id(&self.account_id)
            .vault_name(vault)
            .upload_id(upload_id)
            .range(range.to_string())
            .checksum(checksum)
            .body(ByteStream::from(Bytes::copy_from_slice(body)))
            .send();

        let res = self.rt.block_on(call).map_err(rejected)?;

        // The service echoes its own tree hash of the part
        if let Some(remote) = res.checksum() {
            if remote != checksum {
                return Err(RemoteError::Rejected(format!(
                    "checksum mismatch for {}: remote {}, local {}",
                    range, remote, checksum
                )));
            }
        }
        Ok(())
    }

    fn finalize_session(
        &self,
        upload_id: &str,
        vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError> {
        let call = self
            .client
            .complete_multipart_upload()
            .account_id(&self.account_id)
            .vault_name(vault)
            .upload_id(upload_id)
            .archive_size(archive_size.to_string())
            .checksum(checksum)
            .send();

        let res = self.rt.block_on(call).map_err(rejected)?;
        let archive_id = res
            .archive_id()
            .ok_or_else(|| RemoteError::Rejected("no archive id in response".to_string()))?;

        Ok(ArchiveReceipt {
            archive_id: archive_id.to_string(),
            location: res.location().map(str::to_string),
            checksum: res.checksum().map(str::to_string),
        })
    }
}

async fn connect(config: &GlacierConfig) -> Client {
    let timeouts = TimeoutConfig::builder()
        .operation_attempt_timeout(config.timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let conf = loader.load().await;
    Client::new(&conf)
}

// Keep the whole source chain, the sdk's top level message is rarely useful alone
fn rejected<E: Error>(err: E) -> RemoteError {
    RemoteError::Rejected(DisplayErrorContext(err).to_string())
}
