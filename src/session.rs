use std::sync::Arc;

use encoding_rs::UTF_8;

use crate::config::DownloadSection;
use crate::error::RebuildError;
use crate::fields::{field_edits, CertificateFields, FieldEdit, FieldExtractor, FieldKey};
use crate::hwpx::package::HwpxPackage;
use crate::hwpx::rebuild::{rebuild_archive, RebuildContext};
use crate::metrics::LayoutConstants;
use crate::progress::ConsoleProgress;
use crate::textutil::{download_filename, today_kst};
use crate::verify::{IdentityVerifier, VerificationOutcome, VerificationRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationState {
    Unverified,
    Verified,
    /// The registry knows the applicant under a different address.
    AddressMismatch { registry_address: String },
    NotFound { message: String },
}

/// One load/edit/download cycle. The archive snapshot is shared and never mutated; every
/// download rebuilds from it.
pub struct EditSession {
    package: Arc<HwpxPackage>,
    original: CertificateFields,
    current: CertificateFields,
    verification: VerificationState,
    require_verification: bool,
}

pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl EditSession {
    pub fn new(
        package: Arc<HwpxPackage>,
        original: CertificateFields,
        require_verification: bool,
    ) -> Self {
        Self {
            package,
            current: original.clone(),
            original,
            verification: VerificationState::Unverified,
            require_verification,
        }
    }

    /// Hands the primary section to the extractor and starts a session from its answer. The
    /// issue date is pre-filled with today's date (KST), as a freshly issued certificate carries.
    pub fn open(
        package: Arc<HwpxPackage>,
        extractor: &dyn FieldExtractor,
        require_verification: bool,
    ) -> Result<Self, RebuildError> {
        let primary = package.primary_section().ok_or(RebuildError::MalformedArchive)?;
        let (xml, had_errors) = UTF_8.decode_with_bom_removal(&primary.data);
        if had_errors {
            return Err(RebuildError::Encoding {
                entry: primary.name.clone(),
            });
        }
        let original = extractor
            .extract(&xml)
            .map_err(|e| RebuildError::Extraction {
                detail: format!("{e:#}"),
            })?;
        let mut session = Self::new(package, original, require_verification);
        session.stamp_issue_date();
        Ok(session)
    }

    pub fn original(&self) -> &CertificateFields {
        &self.original
    }

    pub fn current(&self) -> &CertificateFields {
        &self.current
    }

    pub fn verification(&self) -> &VerificationState {
        &self.verification
    }

    pub fn set_field(&mut self, key: FieldKey, value: impl Into<String>) {
        let value = value.into();
        if self.current.get(key) == value {
            return;
        }
        self.current.set(key, value);
        if key.is_identity() {
            self.verification = VerificationState::Unverified;
        }
    }

    /// Copies every non-empty editable field of `fields` into the current values.
    pub fn apply_fields(&mut self, fields: &CertificateFields) {
        for key in FieldKey::EDITABLE {
            let value = fields.get(key);
            if !value.is_empty() {
                self.set_field(key, value);
            }
        }
    }

    /// Back to the extracted values, with today's issue date.
    pub fn reset(&mut self) {
        self.current = self.original.clone();
        self.verification = VerificationState::Unverified;
        self.stamp_issue_date();
    }

    /// Puts the extracted issue date back instead of today's.
    pub fn keep_extracted_issue_date(&mut self) {
        let extracted = self.original.issue_date.clone();
        self.set_field(FieldKey::IssueDate, extracted);
    }

    pub fn stamp_issue_date(&mut self) {
        self.set_field(FieldKey::IssueDate, today_kst());
    }

    pub fn verification_request(&self) -> VerificationRequest {
        VerificationRequest::new(&self.current.applicant, &self.current.ssn, &self.current.address)
    }

    pub fn apply_verification(&mut self, outcome: &VerificationOutcome) {
        self.verification = if outcome.is_verified() {
            VerificationState::Verified
        } else if outcome.success {
            VerificationState::AddressMismatch {
                registry_address: outcome.db_address.clone().unwrap_or_default(),
            }
        } else {
            VerificationState::NotFound {
                message: outcome.message.clone().unwrap_or_default(),
            }
        };
    }

    pub fn verify_with(
        &mut self,
        verifier: &dyn IdentityVerifier,
    ) -> anyhow::Result<&VerificationState> {
        let outcome = verifier.verify(&self.verification_request())?;
        self.apply_verification(&outcome);
        Ok(&self.verification)
    }

    /// Takes the registry's address after a mismatch. Returns false when there is nothing to
    /// accept.
    pub fn accept_registry_address(&mut self) -> bool {
        let registry_address = match &self.verification {
            VerificationState::AddressMismatch { registry_address }
                if !registry_address.is_empty() =>
            {
                registry_address.clone()
            }
            _ => return false,
        };
        self.current.address = registry_address;
        self.verification = VerificationState::Verified;
        true
    }

    pub fn is_verified(&self) -> bool {
        self.verification == VerificationState::Verified
    }

    pub fn edits(&self) -> Vec<FieldEdit> {
        field_edits(&self.original, &self.current)
    }

    pub fn download(
        &self,
        layout: &LayoutConstants,
        download: &DownloadSection,
        progress: &ConsoleProgress,
    ) -> Result<Download, RebuildError> {
        if self.require_verification && !self.is_verified() {
            return Err(RebuildError::NotVerified);
        }
        let edits = self.edits();
        let ctx = RebuildContext {
            edits: &edits,
            company_address: &self.original.company_address,
            layout,
        };
        let bytes = rebuild_archive(&self.package, &ctx, progress)?;
        Ok(Download {
            filename: download_filename(&download.filename_prefix, &self.current.applicant),
            bytes,
        })
    }
}
