/// Failures that abort building the edited archive. No partial archive is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("no section XML entry (Contents/section<N>.xml) found; not a standard HWPX file")]
    MalformedArchive,

    #[error("section {entry} is not valid UTF-8")]
    Encoding { entry: String },

    #[error("parse xml {entry}: {detail}")]
    Parse { entry: String, detail: String },

    #[error("serialize xml {entry}: {detail}")]
    Serialize { entry: String, detail: String },

    #[error("field extraction failed: {detail}")]
    Extraction { detail: String },

    #[error("archive: {detail}")]
    Archive { detail: String },

    #[error("applicant identity has not been verified")]
    NotVerified,
}
