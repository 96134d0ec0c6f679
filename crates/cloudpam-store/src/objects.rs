//! Thin wrapper around the AWS S3 SDK — get/put/list/delete by key, with
//! ETag-based optimistic concurrency. Versioning and presigning are out of
//! scope (CloudPAM has no use for either — see `DESIGN.md`).

use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::ByteStream;

use crate::error::ObjectError;

/// Result of a GET operation, including the body and ETag.
pub struct GetObjectOutput {
    pub body: Vec<u8>,
    pub etag: Option<String>,
}

/// Get an object from S3.
pub async fn get_object(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<GetObjectOutput, ObjectError> {
    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| {
            let err = e.into_service_error();
            if err.is_no_such_key() {
                ObjectError::NotFound {
                    key: key.to_string(),
                }
            } else {
                ObjectError::GetObject(err.to_string())
            }
        })?;

    let etag = resp.e_tag().map(|s| s.to_string());
    let body = resp
        .body
        .collect()
        .await
        .map_err(|e| ObjectError::GetObject(e.to_string()))?
        .into_bytes()
        .to_vec();

    Ok(GetObjectOutput { body, etag })
}

/// Put an object to S3. Returns the new ETag.
pub async fn put_object(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
) -> Result<String, ObjectError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/json")
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| ObjectError::PutObject(e.into_service_error().to_string()))?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}

/// Put an object to S3 with an If-Match precondition (ETag optimistic
/// locking). Returns the new ETag on success, or
/// `ObjectError::PreconditionFailed` if the ETag doesn't match — the
/// caller is expected to re-read, re-apply its mutation, and retry.
pub async fn put_object_if_match(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    expected_etag: &str,
) -> Result<String, ObjectError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/json")
        .body(ByteStream::from(body))
        .if_match(expected_etag)
        .send()
        .await
        .map_err(|e| {
            let err = e.into_service_error();
            if err.to_string().contains("PreconditionFailed") {
                ObjectError::PreconditionFailed {
                    key: key.to_string(),
                }
            } else {
                ObjectError::PutObject(err.to_string())
            }
        })?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}

/// Put an object only if it does not already exist (`If-None-Match: *`).
/// Used for first-time creation where the caller wants a conflict on race.
pub async fn put_object_if_absent(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
) -> Result<String, ObjectError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/json")
        .body(ByteStream::from(body))
        .if_none_match("*")
        .send()
        .await
        .map_err(|e| {
            let err = e.into_service_error();
            if err.to_string().contains("PreconditionFailed") {
                ObjectError::PreconditionFailed {
                    key: key.to_string(),
                }
            } else {
                ObjectError::PutObject(err.to_string())
            }
        })?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}

/// Delete an object from S3. Deleting a missing key is not an error (S3
/// semantics: `DeleteObject` is idempotent).
pub async fn delete_object(client: &Client, bucket: &str, key: &str) -> Result<(), ObjectError> {
    client
        .delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| ObjectError::DeleteObject(e.into_service_error().to_string()))?;

    Ok(())
}

/// Delete all objects under a prefix. Returns the number of objects deleted.
pub async fn delete_objects_by_prefix(
    client: &Client,
    bucket: &str,
    prefix: &str,
) -> Result<usize, ObjectError> {
    let keys = list_objects(client, bucket, prefix).await?;
    let count = keys.len();
    for key in &keys {
        delete_object(client, bucket, key).await?;
    }
    Ok(count)
}

/// List objects under a prefix. Returns keys.
pub async fn list_objects(
    client: &Client,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>, ObjectError> {
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut req = client.list_objects_v2().bucket(bucket).prefix(prefix);

        if let Some(token) = &continuation_token {
            req = req.continuation_token(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ObjectError::ListObjects(e.into_service_error().to_string()))?;

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                keys.push(key.to_string());
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(|s| s.to_string());
        } else {
            break;
        }
    }

    Ok(keys)
}
