//! Shared key derivation for storage backends.
//!
//! Key format: `{user_id}/{yyyy}/{mm}/{dd}/{upload_id}.{extension}`.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

/// Derive the storage key for an upload.
///
/// The key is derived once at creation from the owner, the creation date, and
/// the upload id, and is never reassigned. The upload id component makes keys
/// globally unique; the date components keep backend listings browsable.
pub fn derive_file_key(
    user_id: Uuid,
    created_at: DateTime<Utc>,
    upload_id: Uuid,
    extension: &str,
) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}.{}",
        user_id,
        created_at.year(),
        created_at.month(),
        created_at.day(),
        upload_id,
        extension
    )
}

/// Key for one part of a resumable upload, addressed by its byte offset.
///
/// Retransmitting the same offset overwrites the same object, so an
/// interrupted PATCH can be retried without leaking part objects.
pub fn part_key(file_key: &str, byte_offset: i64) -> String {
    format!("{}.part.{}", file_key, byte_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_key_layout() {
        let user = Uuid::parse_str("6a9f5fb3-7f3e-4f1a-9f24-111111111111").unwrap();
        let id = Uuid::parse_str("0d0a52f6-2b9f-46e7-8f7a-222222222222").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();

        let key = derive_file_key(user, at, id, "png");
        assert_eq!(
            key,
            "6a9f5fb3-7f3e-4f1a-9f24-111111111111/2026/08/07/0d0a52f6-2b9f-46e7-8f7a-222222222222.png"
        );
        assert!(!key.starts_with('/'));
        assert!(!key.contains(".."));
    }

    #[test]
    fn distinct_uploads_never_collide() {
        let user = Uuid::new_v4();
        let at = Utc::now();
        let a = derive_file_key(user, at, Uuid::new_v4(), "bin");
        let b = derive_file_key(user, at, Uuid::new_v4(), "bin");
        assert_ne!(a, b);
    }

    #[test]
    fn part_keys_are_offset_addressed() {
        assert_eq!(part_key("u/2026/08/07/x.png", 0), "u/2026/08/07/x.png.part.0");
        assert_eq!(
            part_key("u/2026/08/07/x.png", 1048576),
            "u/2026/08/07/x.png.part.1048576"
        );
    }
}
