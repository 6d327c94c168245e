//! System prompts for the reply model

use crate::config::AssistantConfig;
use crate::retrieval::ScoredCandidate;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Shown to the model when a product search found nothing relevant
pub const NO_PRODUCT_FOUND: &str =
    "Không tìm thấy thông tin sản phẩm nào phù hợp với câu hỏi của bạn.";

/// Builds the persona prompt, optionally grounded in retrieved products
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    shop: String,
}

impl PromptBuilder {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            persona: config.persona_name.clone(),
            shop: config.shop_name.clone(),
        }
    }

    /// `products` is `None` on the chat path and `Some` (possibly empty) after a search
    pub fn system_prompt(&self, summary: Option<&str>, products: Option<&[ScoredCandidate]>) -> String {
        let mut prompt = format!(
            "Bạn là {persona}, nhân viên tư vấn điện thoại nhiệt tình của {shop}. \
Hãy trả lời người dùng một cách thân thiện, minh bạch và lịch sự, không viết hoa toàn bộ. \
Luôn xưng là {persona} thay vì \"tôi\".",
            persona = self.persona,
            shop = self.shop,
        );

        if let Some(summary) = summary {
            prompt.push_str("\n\nTóm tắt cuộc trò chuyện trước đó:\n");
            prompt.push_str(summary);
        }

        match products {
            None => {}
            Some([]) => {
                prompt.push_str("\n\n");
                prompt.push_str(NO_PRODUCT_FOUND);
                prompt.push_str(
                    " Hãy nói rõ với khách rằng shop chưa có thông tin này, \
không tự bịa ra sản phẩm, giá hay thông số, và gợi ý khách mô tả nhu cầu cụ thể hơn.",
                );
            }
            Some(products) => {
                prompt.push_str(
                    "\n\nChỉ dựa vào thông tin sản phẩm dưới đây để trả lời chi tiết, dễ hiểu. \
Nếu thông tin không có trong danh sách, hãy nói là chưa có thông tin.\n\n",
                );
                prompt.push_str(&format_context(products));
            }
        }

        prompt
    }
}

/// One block per product, in rank order
///
/// Price, colours, stock status and branches are listed when the catalog has them.
pub fn format_context(products: &[ScoredCandidate]) -> String {
    products
        .iter()
        .map(|candidate| {
            let doc = &candidate.document;
            let meta = &doc.metadata;

            let mut block = format!("Nguồn: {}\nURL: {}", doc.title(), meta.url);
            if let Some(price) = meta.price {
                block.push_str("\nGiá: ");
                block.push_str(&format_vnd(price));
            }
            if !meta.colors.is_empty() {
                block.push_str("\nMàu sắc: ");
                block.push_str(&meta.colors.join(", "));
            }
            if !meta.status.trim().is_empty() {
                block.push_str("\nTình trạng: ");
                block.push_str(meta.status.trim());
            }
            if !meta.branches.is_empty() {
                block.push_str("\nChi nhánh: ");
                block.push_str(&meta.branches.join("; "));
            }
            block.push_str("\nNội dung: ");
            block.push_str(&doc.text);
            block
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// `19990000` -> `19.990.000đ`
pub fn format_vnd(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out.push('đ');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Document, DocumentMetadata};
    use crate::config::Config;
    use crate::retrieval::CandidateSource;
    use std::sync::Arc;

    fn candidate(title: &str, url: &str, text: &str) -> ScoredCandidate {
        let metadata = DocumentMetadata {
            title: title.to_string(),
            url: url.to_string(),
            ..Default::default()
        };
        ScoredCandidate::new(
            Arc::new(Document::new(title, text, metadata)),
            1.0,
            CandidateSource::Fused,
        )
    }

    fn builder() -> PromptBuilder {
        PromptBuilder::new(&Config::default().assistant)
    }

    #[test]
    fn test_context_format() {
        let context = format_context(&[
            candidate("iPhone 15", "https://shop/ip15", "iPhone 15 128GB"),
            candidate("Galaxy S24", "https://shop/s24", "Galaxy S24 256GB"),
        ]);
        assert_eq!(
            context,
            "Nguồn: iPhone 15\nURL: https://shop/ip15\nNội dung: iPhone 15 128GB\n\n---\n\n\
Nguồn: Galaxy S24\nURL: https://shop/s24\nNội dung: Galaxy S24 256GB"
        );
    }

    #[test]
    fn test_context_lists_price_and_availability() {
        let metadata = DocumentMetadata {
            title: "iPhone 15 128GB".to_string(),
            url: "https://shop/ip15".to_string(),
            price: Some(19_990_000),
            colors: vec!["Đen".to_string(), "Hồng".to_string()],
            status: "Còn hàng".to_string(),
            branches: vec!["Hà Nội".to_string(), "TP.HCM".to_string()],
            ..Default::default()
        };
        let product = ScoredCandidate::new(
            Arc::new(Document::new("ip15", "iPhone 15 128GB chip A16", metadata)),
            1.0,
            CandidateSource::Fused,
        );

        let context = format_context(&[product]);
        assert_eq!(
            context,
            "Nguồn: iPhone 15 128GB\nURL: https://shop/ip15\nGiá: 19.990.000đ\n\
Màu sắc: Đen, Hồng\nTình trạng: Còn hàng\nChi nhánh: Hà Nội; TP.HCM\n\
Nội dung: iPhone 15 128GB chip A16"
        );
    }

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(0), "0đ");
        assert_eq!(format_vnd(990), "990đ");
        assert_eq!(format_vnd(4_890_000), "4.890.000đ");
        assert_eq!(format_vnd(29_990_000), "29.990.000đ");
    }

    #[test]
    fn test_chat_prompt_has_no_product_section() {
        let prompt = builder().system_prompt(None, None);
        assert!(prompt.contains("Lisa"));
        assert!(!prompt.contains("Nguồn:"));
        assert!(!prompt.contains(NO_PRODUCT_FOUND));
    }

    #[test]
    fn test_empty_search_uses_no_product_instruction() {
        let prompt = builder().system_prompt(Some("Khách cần máy pin trâu"), Some(&[]));
        assert!(prompt.contains(NO_PRODUCT_FOUND));
        assert!(prompt.contains("Khách cần máy pin trâu"));
        assert!(!prompt.contains("Nguồn:"));
    }

    #[test]
    fn test_products_are_included() {
        let products = [candidate("iPhone 15", "https://shop/ip15", "iPhone 15 128GB")];
        let prompt = builder().system_prompt(None, Some(&products));
        assert!(prompt.ends_with("Nội dung: iPhone 15 128GB"));
    }
}
