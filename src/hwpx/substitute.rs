use crate::hwpx::xml::{is_structural_attribute_key, Node};

/// Label spellings that may directly precede the applicant address in the template.
pub const ADDRESS_LABEL_PREFIXES: [&str; 4] = ["주소지:", "주소지 :", "주소지: ", "주소지"];

/// Replaces every literal occurrence of `original` with `current` in the string leaves of
/// `node`, leaving attribute values alone. Returns the number of occurrences replaced.
pub fn substitute(node: &mut Node, original: &str, current: &str) -> usize {
    if original.is_empty() {
        return 0;
    }
    match node {
        Node::Text(text) => replace_literal(text, original, current),
        Node::Seq(items) => items
            .iter_mut()
            .map(|n| substitute(n, original, current))
            .sum(),
        Node::Map(entries) => entries
            .iter_mut()
            .filter(|(k, _)| !is_structural_attribute_key(k))
            .map(|(_, n)| substitute(n, original, current))
            .sum(),
    }
}

fn replace_literal(text: &mut String, from: &str, to: &str) -> usize {
    let hits = text.matches(from).count();
    if hits > 0 {
        *text = text.replace(from, to);
    }
    hits
}

/// Address substitution that prefers occurrences written right after the address label.
///
/// Bare occurrences are only rewritten when no labelled one exists, and never when the applicant
/// address equals the company address (the issuer block would be rewritten too).
pub fn substitute_address(
    node: &mut Node,
    original: &str,
    current: &str,
    company_address: &str,
) -> usize {
    if original.is_empty() {
        return 0;
    }
    let mut replaced = 0;
    for prefix in ADDRESS_LABEL_PREFIXES {
        replaced += substitute(
            node,
            &format!("{prefix}{original}"),
            &format!("{prefix}{current}"),
        );
    }
    if replaced == 0 && original != company_address {
        replaced = substitute(node, original, current);
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwpx::xml::{parse_document, write_document};

    const DOC: &str = r#"<hs:sec><hp:p paraPrIDRef="서울시"><hp:run><hp:t>신청인: 홍길동 (서울시 거주)</hp:t></hp:run><hp:run><hp:t>서울시 서울시</hp:t></hp:run></hp:p><hp:p><hp:run><hp:t>업체 주소: 부산시</hp:t></hp:run></hp:p></hs:sec>"#;

    #[test]
    fn replaces_all_text_occurrences_but_not_attributes() {
        let mut root = parse_document(DOC).expect("parse");
        let hits = substitute(&mut root, "서울시", "대전시");
        assert_eq!(hits, 3);
        let out = write_document(&root).expect("write");
        assert!(out.contains(r#"paraPrIDRef="서울시""#));
        assert!(out.contains("홍길동 (대전시 거주)"));
        assert!(out.contains("<hp:t>대전시 대전시</hp:t>"));
        assert!(!out.contains(">서울시"));
    }

    #[test]
    fn replacing_with_itself_is_identity() {
        let before = parse_document(DOC).expect("parse");
        let mut after = before.clone();
        substitute(&mut after, "서울시", "서울시");
        assert_eq!(before, after);
    }

    #[test]
    fn empty_original_replaces_nothing() {
        let before = parse_document(DOC).expect("parse");
        let mut after = before.clone();
        assert_eq!(substitute(&mut after, "", "x"), 0);
        assert_eq!(before, after);
    }

    #[test]
    fn literal_not_regex() {
        let mut node = Node::Text("a.b a+b".to_string());
        assert_eq!(substitute(&mut node, "a.b", "X"), 1);
        assert_eq!(node, Node::Text("X a+b".to_string()));
    }

    #[test]
    fn non_overlapping_left_to_right() {
        let mut node = Node::Text("aaa".to_string());
        assert_eq!(substitute(&mut node, "aa", "b"), 1);
        assert_eq!(node, Node::Text("ba".to_string()));
    }

    #[test]
    fn address_prefers_labelled_occurrence() {
        let xml = "<r><t>주소지: 서울시 중구</t><t>본사: 서울시 중구</t></r>";
        let mut root = parse_document(xml).expect("parse");
        let hits = substitute_address(&mut root, "서울시 중구", "대전시 서구", "");
        assert_eq!(hits, 1);
        let out = write_document(&root).expect("write");
        assert_eq!(out, "<r><t>주소지: 대전시 서구</t><t>본사: 서울시 중구</t></r>");
    }

    #[test]
    fn address_falls_back_to_bare_text() {
        let xml = "<r><t>서울시 중구</t></r>";
        let mut root = parse_document(xml).expect("parse");
        assert_eq!(substitute_address(&mut root, "서울시 중구", "대전시", "부산시"), 1);
        assert_eq!(write_document(&root).expect("write"), "<r><t>대전시</t></r>");
    }

    #[test]
    fn address_equal_to_company_address_is_not_bare_replaced() {
        let xml = "<r><t>서울시 중구</t></r>";
        let mut root = parse_document(xml).expect("parse");
        let before = root.clone();
        assert_eq!(substitute_address(&mut root, "서울시 중구", "대전시", "서울시 중구"), 0);
        assert_eq!(root, before);
    }
}
