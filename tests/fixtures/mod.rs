//! Test fixtures: image payloads and the expected mapping for each label the
//! mock classifier can produce.
#![allow(dead_code)]

use agri_diagnose::models::taxonomy::{ActionPolicy, Category};

/// Smallest prefix `image::guess_format` accepts as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// JFIF header.
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
];

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\n";

/// Expected diagnosis for a classifier label.
#[derive(Debug, Clone)]
pub struct LabelFixture {
    pub label: &'static str,
    pub canonical_name: &'static str,
    pub category: Category,
    pub policy: ActionPolicy,
    pub confidence: f64,
}

impl LabelFixture {
    pub fn expects_report(&self) -> bool {
        self.policy == ActionPolicy::Retrieve
    }
}

/// One row per mock classifier outcome.
pub const LABEL_FIXTURES: &[LabelFixture] = &[
    LabelFixture {
        label: "healthy",
        canonical_name: "Healthy",
        category: Category::Status,
        policy: ActionPolicy::Skip,
        confidence: 0.95,
    },
    LabelFixture {
        label: "powdery_mildew",
        canonical_name: "Powdery Mildew",
        category: Category::Disease,
        policy: ActionPolicy::Retrieve,
        confidence: 0.87,
    },
    LabelFixture {
        label: "aphid_complex",
        canonical_name: "Aphids",
        category: Category::Pest,
        policy: ActionPolicy::Retrieve,
        confidence: 0.92,
    },
    LabelFixture {
        label: "spider_mite",
        canonical_name: "Spider Mites",
        category: Category::Pest,
        policy: ActionPolicy::Retrieve,
        confidence: 0.78,
    },
    LabelFixture {
        label: "late_blight",
        canonical_name: "Late Blight",
        category: Category::Disease,
        policy: ActionPolicy::Retrieve,
        confidence: 0.85,
    },
];

pub fn fixture_for(label: &str) -> Option<&'static LabelFixture> {
    LABEL_FIXTURES.iter().find(|f| f.label == label)
}
