use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

// The execution endpoint refuses signatures past this expiry; the
// dispatch contract pins it to i32::MAX rather than a rolling window.
const SIG_EXPIRY: &str = "2147483647";

/// Build the form body for one dispatch, signed over everything except
/// the trailing signature parameter itself.
pub fn signed_body(job_type: &str, maxtime: u64, secret: &str) -> String {
    let unsigned = format!(
        "async=false&maxtime={maxtime}&sigexpiry={SIG_EXPIRY}&tasks=placeholder&title=Special:RunJobs&type={job_type}"
    );
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC key should be valid");
    mac.update(unsigned.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{unsigned}&signature={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_layout_and_signature() {
        let body = signed_body("refreshLinks", 30, "swordfish");
        assert_eq!(
            body,
            "async=false&maxtime=30&sigexpiry=2147483647&tasks=placeholder&title=Special:RunJobs&type=refreshLinks&signature=4fd88af661e7f9bcd7e7747c4ccfa5ead830bcc6"
        );
    }

    #[test]
    fn signature_covers_type_and_maxtime() {
        let body = signed_body("webVideoTranscode", 60, "hunter2");
        assert!(body.ends_with("&signature=378edd5e26f1ceb10abe74fc37ee1d5af237ab26"));
        // Different inputs, different signature
        assert_ne!(
            signed_body("webVideoTranscode", 61, "hunter2"),
            signed_body("webVideoTranscode", 60, "hunter2")
        );
        assert_ne!(
            signed_body("webVideoTranscode", 60, "other"),
            signed_body("webVideoTranscode", 60, "hunter2")
        );
    }
}
