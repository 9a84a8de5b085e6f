use chrono::{Datelike, FixedOffset, NaiveDate, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Today's date in Korea Standard Time, as written on the certificate.
pub fn today_kst() -> String {
    let now = match FixedOffset::east_opt(KST_OFFSET_SECS) {
        Some(kst) => Utc::now().with_timezone(&kst).date_naive(),
        None => Utc::now().date_naive(),
    };
    format_korean_date(now)
}

/// `2025년 1월 2일`
pub fn format_korean_date(date: NaiveDate) -> String {
    format!("{}년 {}월 {}일", date.year(), date.month(), date.day())
}

pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// `<prefix>_<applicant>.hwpx`
pub fn download_filename(prefix: &str, applicant: &str) -> String {
    let applicant = sanitize_filename(applicant);
    let stem = if applicant.is_empty() {
        "document".to_string()
    } else {
        applicant
    };
    let prefix = sanitize_filename(prefix);
    if prefix.is_empty() {
        format!("{stem}.hwpx")
    } else {
        format!("{prefix}_{stem}.hwpx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_date() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 2).expect("date");
        assert_eq!(format_korean_date(d), "2025년 1월 2일");
        assert!(today_kst().ends_with('일'));
    }

    #[test]
    fn filenames() {
        assert_eq!(download_filename("해촉증명서", "홍길동"), "해촉증명서_홍길동.hwpx");
        assert_eq!(download_filename("해촉증명서", " a/b:c "), "해촉증명서_a_b_c.hwpx");
        assert_eq!(download_filename("해촉증명서", ""), "해촉증명서_document.hwpx");
        assert_eq!(download_filename("", "홍길동"), "홍길동.hwpx");
    }
}
