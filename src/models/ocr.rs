//! OCR service response models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An image extracted from a page, referenced from the page markdown by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    /// Provider fields kept as received (bounding boxes and the like).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One OCR'd page in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<PageImage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Page {
    pub fn new(index: u32, markdown: impl Into<String>) -> Self {
        Self {
            index,
            markdown: markdown.into(),
            images: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Markdown with `![id](id)` placeholders replaced by inline base64 data.
    pub fn markdown_with_images(&self) -> String {
        let mut markdown = self.markdown.clone();
        for image in &self.images {
            if let Some(data) = &image.image_base64 {
                markdown = markdown.replace(
                    &format!("![{}]({})", image.id, image.id),
                    &format!("![{}]({})", image.id, data),
                );
            }
        }
        markdown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrUsage {
    #[serde(default)]
    pub pages_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_size_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full response of the OCR endpoint; persisted verbatim as the OCR artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub pages: Vec<Page>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage_info: OcrUsage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrResponse {
    /// All pages joined by blank lines, with images inlined.
    pub fn combined_markdown(&self) -> String {
        self.pages
            .iter()
            .map(Page::markdown_with_images)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn page_markdowns(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.markdown.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_markdown_inlines_images() {
        let mut first = Page::new(0, "# Title\n![img-0.jpeg](img-0.jpeg)");
        first.images.push(PageImage {
            id: "img-0.jpeg".to_string(),
            image_base64: Some("data:image/jpeg;base64,AAA".to_string()),
            extra: Map::new(),
        });
        let response = OcrResponse {
            pages: vec![first, Page::new(1, "second page")],
            model: "mistral-ocr-latest".to_string(),
            usage_info: OcrUsage::default(),
            extra: Map::new(),
        };

        assert_eq!(
            response.combined_markdown(),
            "# Title\n![img-0.jpeg](data:image/jpeg;base64,AAA)\n\nsecond page"
        );
    }

    #[test]
    fn test_parse_minimal_response() {
        let response: OcrResponse = serde_json::from_str(
            r#"{"pages": [{"index": 0, "markdown": "hi", "images": [{"id": "a"}]}]}"#,
        )
        .unwrap();
        assert_eq!(response.pages.len(), 1);
        assert_eq!(response.page_markdowns(), vec!["hi"]);
        assert!(response.pages[0].images[0].image_base64.is_none());
    }

    #[test]
    fn test_provider_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "pages": [{
                "index": 0,
                "markdown": "hi",
                "images": [{"id": "a", "top_left_x": 10, "bottom_right_y": 80}],
                "dimensions": {"dpi": 200, "height": 2200, "width": 1700}
            }],
            "model": "mistral-ocr-latest",
            "usage_info": {"pages_processed": 1, "doc_size_bytes": 512, "billed_pages": 1},
            "document_annotation": null
        });

        let response: OcrResponse = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(response.pages[0].extra["dimensions"]["dpi"], 200);
        assert_eq!(serde_json::to_value(&response).unwrap(), raw);
    }
}
