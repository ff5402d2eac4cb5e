use lettre::Address;

const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

pub fn is_valid_email(raw: &str) -> bool {
    raw.parse::<Address>().is_ok()
}

/// Returns the trimmed address when it is a valid email, otherwise an empty string.
pub fn clean_email(raw: &str) -> String {
    let trimmed = raw.trim();
    if is_valid_email(trimmed) {
        trimmed.to_string()
    } else {
        String::new()
    }
}

pub fn clean_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !UNSAFE_FILENAME_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();

    if cleaned.is_empty() {
        DEFAULT_ATTACHMENT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_is_kept() {
        assert_eq!(clean_email("b@x.com"), "b@x.com");
        assert_eq!(clean_email("  b@x.com \n"), "b@x.com");
    }

    #[test]
    fn invalid_email_is_dropped() {
        assert_eq!(clean_email("not-an-email"), "");
        assert_eq!(clean_email("two words@x.com"), "");
        assert_eq!(clean_email(""), "");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("someone@example.org"));
        assert!(!is_valid_email("someone"));
        assert!(!is_valid_email("@example.org"));
    }

    #[test]
    fn filename_loses_path_and_unsafe_chars() {
        assert_eq!(clean_filename("report.pdf"), "report.pdf");
        assert_eq!(clean_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(clean_filename("report: Q1?.pdf"), "report Q1.pdf");
        assert_eq!(clean_filename("tab\there.txt"), "tabhere.txt");
    }

    #[test]
    fn filename_falls_back_when_nothing_is_left() {
        assert_eq!(clean_filename("///"), DEFAULT_ATTACHMENT_NAME);
        assert_eq!(clean_filename(" .. "), DEFAULT_ATTACHMENT_NAME);
    }
}
