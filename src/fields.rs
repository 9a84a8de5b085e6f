use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// The eleven certificate fields, in the shape the extraction service returns them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateFields {
    pub applicant: String,
    pub ssn: String,
    pub address: String,
    pub service_period: String,
    pub service_content: String,
    pub purpose: String,
    pub company_name: String,
    pub business_no: String,
    pub company_address: String,
    pub representative: String,
    pub issue_date: String,
}

impl CertificateFields {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parse certificate fields json")
    }

    pub fn from_json_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read fields json: {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("fields json: {}", path.display()))
    }

    pub fn get(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::Applicant => &self.applicant,
            FieldKey::Ssn => &self.ssn,
            FieldKey::Address => &self.address,
            FieldKey::ServicePeriod => &self.service_period,
            FieldKey::ServiceContent => &self.service_content,
            FieldKey::Purpose => &self.purpose,
            FieldKey::IssueDate => &self.issue_date,
        }
    }

    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        let slot = match key {
            FieldKey::Applicant => &mut self.applicant,
            FieldKey::Ssn => &mut self.ssn,
            FieldKey::Address => &mut self.address,
            FieldKey::ServicePeriod => &mut self.service_period,
            FieldKey::ServiceContent => &mut self.service_content,
            FieldKey::Purpose => &mut self.purpose,
            FieldKey::IssueDate => &mut self.issue_date,
        };
        *slot = value.into();
    }
}

/// Fields the user may change. Company fields are fixed by the template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Applicant,
    Ssn,
    Address,
    ServicePeriod,
    ServiceContent,
    Purpose,
    IssueDate,
}

impl FieldKey {
    pub const EDITABLE: [FieldKey; 7] = [
        FieldKey::Applicant,
        FieldKey::Ssn,
        FieldKey::Address,
        FieldKey::ServicePeriod,
        FieldKey::ServiceContent,
        FieldKey::Purpose,
        FieldKey::IssueDate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FieldKey::Applicant => "신청인",
            FieldKey::Ssn => "주민등록번호",
            FieldKey::Address => "주소지",
            FieldKey::ServicePeriod => "용역기간",
            FieldKey::ServiceContent => "용역내용",
            FieldKey::Purpose => "용도",
            FieldKey::IssueDate => "발급일",
        }
    }

    /// Fields checked against the identity registry; changing them voids a verification.
    pub fn is_identity(self) -> bool {
        matches!(self, FieldKey::Applicant | FieldKey::Ssn | FieldKey::Address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldEdit {
    pub key: FieldKey,
    pub original: String,
    pub current: String,
}

impl FieldEdit {
    /// Only a change between two non-empty values is written into the document.
    pub fn is_effective(&self) -> bool {
        !self.original.is_empty() && !self.current.is_empty() && self.original != self.current
    }
}

pub fn field_edits(original: &CertificateFields, current: &CertificateFields) -> Vec<FieldEdit> {
    FieldKey::EDITABLE
        .iter()
        .map(|&key| FieldEdit {
            key,
            original: original.get(key).to_string(),
            current: current.get(key).to_string(),
        })
        .collect()
}

/// Reads the certificate fields out of the primary section XML.
pub trait FieldExtractor {
    fn extract(&self, section_xml: &str) -> anyhow::Result<CertificateFields>;
}

/// Uses an extraction response saved as JSON instead of calling the service.
pub struct SavedResponseExtractor {
    pub path: PathBuf,
}

impl FieldExtractor for SavedResponseExtractor {
    fn extract(&self, _section_xml: &str) -> anyhow::Result<CertificateFields> {
        CertificateFields::from_json_path(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_response() {
        let json = r#"{
            "applicant": "홍길동",
            "ssn": "900101-1234567",
            "address": "서울시 중구",
            "servicePeriod": "2024.01.01 ~ 2024.12.31",
            "serviceContent": "강의",
            "purpose": "국민건강보험공단",
            "companyName": "한빛",
            "businessNo": "123-45-67890",
            "companyAddress": "부산시",
            "representative": "김대표",
            "issueDate": "2025년 1월 2일"
        }"#;
        let f = CertificateFields::from_json_str(json).expect("parse");
        assert_eq!(f.service_period, "2024.01.01 ~ 2024.12.31");
        assert_eq!(f.company_address, "부산시");
        assert_eq!(f.get(FieldKey::IssueDate), "2025년 1월 2일");
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let f = CertificateFields::from_json_str(r#"{"applicant":"홍길동"}"#).expect("parse");
        assert_eq!(f.applicant, "홍길동");
        assert!(f.address.is_empty());
    }

    #[test]
    fn only_real_changes_are_effective() {
        let mut original = CertificateFields {
            address: "서울시".to_string(),
            applicant: "홍길동".to_string(),
            ..Default::default()
        };
        let mut current = original.clone();
        current.set(FieldKey::Applicant, "김철수");
        current.set(FieldKey::Purpose, "국민연금공단");
        original.purpose.clear();

        let edits = field_edits(&original, &current);
        assert_eq!(edits.len(), FieldKey::EDITABLE.len());
        let effective: Vec<FieldKey> = edits
            .iter()
            .filter(|e| e.is_effective())
            .map(|e| e.key)
            .collect();
        assert_eq!(effective, vec![FieldKey::Applicant]);

        let unchanged = edits
            .iter()
            .find(|e| e.key == FieldKey::Address)
            .expect("address edit");
        assert_eq!(unchanged.original, "서울시");
        assert!(!unchanged.is_effective());
    }
}
