//! S3 object sink.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::sink::{validate_key, ObjectSink, SinkError};

/// S3 error codes worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "ServiceUnavailable",
    "SlowDown",
    "RequestTimeTooSkewed",
];

/// Stores objects in an S3 bucket, optionally under a key prefix.
///
/// Creating an S3 client is relatively expensive, so one sink should be
/// shared for the lifetime of an instance.
#[derive(Debug, Clone)]
pub struct S3ObjectSink {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectSink {
    /// Create a sink using the default AWS configuration chain.
    pub async fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::with_client(aws_sdk_s3::Client::new(&sdk_config), bucket, prefix)
    }

    /// Create a sink from an existing client.
    pub fn with_client(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self {
            client,
            bucket: bucket.into(),
            prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Map an SDK failure onto retryable or permanent.
fn classify<E, R>(key: &str, action: &str, err: SdkError<E, R>) -> SinkError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let reason = format!("Failed to {action} '{key}': {}", DisplayErrorContext(&err));
    match &err {
        SdkError::ServiceError(context) => match context.err().code() {
            Some(code) if TRANSIENT_CODES.contains(&code) => SinkError::Unavailable(reason),
            _ => SinkError::Rejected {
                key: key.to_string(),
                reason,
            },
        },
        SdkError::ConstructionFailure(_) => SinkError::Rejected {
            key: key.to_string(),
            reason,
        },
        // timeouts, dispatch and response failures
        _ => SinkError::Unavailable(reason),
    }
}

#[async_trait]
impl ObjectSink for S3ObjectSink {
    async fn put_object(&self, key: &str, bytes: Bytes) -> Result<(), SinkError> {
        validate_key(key)?;
        let full_key = self.full_key(key);
        let len = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| classify(&full_key, "put", e))?;

        tracing::debug!("Wrote {} bytes to s3://{}/{}", len, self.bucket, full_key);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, SinkError> {
        validate_key(key)?;
        let full_key = self.full_key(key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => return Err(classify(&full_key, "get", e)),
        };

        let data = response.body.collect().await.map_err(|e| {
            SinkError::Unavailable(format!("Failed to read body of '{full_key}': {e}"))
        })?;
        Ok(Some(data.into_bytes()))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        let full_prefix = self.full_key(prefix);
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(&full_prefix, "list", e))?;

            for object in response.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    // skip directory markers
                    if key.ends_with('/') {
                        continue;
                    }
                    if let Some(relative) = key.strip_prefix(&self.prefix) {
                        keys.push(relative.to_string());
                    }
                }
            }

            // Handle pagination
            if response.is_truncated == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        keys.sort();
        tracing::debug!(
            "Listed {} objects in s3://{}/{}",
            keys.len(),
            self.bucket,
            full_prefix
        );
        Ok(keys)
    }
}
