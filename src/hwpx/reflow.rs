//! Address block re-layout.
//!
//! HWPX keeps the result of the word processor's line breaking in each paragraph's
//! `linesegarray`. After the address text changes, the stored segments no longer match the text,
//! so the address paragraph gets freshly wrapped segments and the paragraphs below it are pushed
//! down when the block grew.

use crate::hwpx::xml::{is_element_key, Node};
use crate::metrics::{char_weight, LayoutConstants};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReflowOutcome {
    pub line_count: usize,
    pub shifted_paragraphs: usize,
    /// Bottom of the address paragraph's last line box.
    pub extent: i64,
}

/// Character offsets where each wrapped line of `address` starts. The first is always 0.
pub fn wrap_address(address: &str, layout: &LayoutConstants) -> Vec<usize> {
    let chars: Vec<char> = address.chars().collect();
    let mut starts = vec![0usize];
    let mut pos = 0usize;
    let mut first = true;

    while pos < chars.len() {
        // The label sits in front of the first line only; later lines are indented past it.
        let (mut used, budget) = if first {
            (layout.label_weight, layout.weight_per_line)
        } else {
            (0.0, layout.continuation_budget())
        };
        let mut end = pos;
        while end < chars.len() {
            let w = char_weight(chars[end]);
            if used + w > budget {
                break;
            }
            used += w;
            end += 1;
        }
        if end >= chars.len() {
            break;
        }

        let brk = soft_break(&chars, pos, end, layout.separator_lookback).unwrap_or(end);
        let mut next = brk;
        while next < chars.len() && chars[next] == ' ' {
            next += 1;
        }
        if next <= pos || next >= chars.len() {
            break;
        }
        starts.push(next);
        pos = next;
        first = false;
    }
    starts
}

/// Nearest break at or before `end` that does not split a word.
fn soft_break(chars: &[char], pos: usize, end: usize, lookback: usize) -> Option<usize> {
    if end > pos && matches!(chars[end], ' ' | '(' | '[') {
        return Some(end);
    }
    let floor = end.saturating_sub(lookback).max(pos);
    (floor..end).rev().find_map(|i| match chars[i] {
        ' ' | ',' => Some(i + 1),
        '(' | '[' if i > pos => Some(i),
        _ => None,
    })
}

/// Re-wraps the first paragraph containing the address label and moves the following sibling
/// paragraphs clear of it. Returns `None` when no paragraph carries the label.
pub fn reflow_address(
    root: &mut Node,
    address: &str,
    layout: &LayoutConstants,
) -> Option<ReflowOutcome> {
    if let Node::Seq(items) = root {
        return items
            .iter_mut()
            .find_map(|item| reflow_address(item, address, layout));
    }

    {
        let mut paragraphs = root.children_mut("p");
        if let Some(idx) = paragraphs
            .iter()
            .position(|p| paragraph_has_marker(p, &layout.label_marker))
        {
            let (head, following) = paragraphs.split_at_mut(idx + 1);
            return Some(reflow_paragraphs(&mut *head[idx], following, address, layout));
        }
    }

    // Paragraphs nested in tables and other containers.
    let Node::Map(entries) = root else {
        return None;
    };
    entries
        .iter_mut()
        .filter(|(k, _)| is_element_key(k))
        .find_map(|(_, child)| reflow_address(child, address, layout))
}

fn reflow_paragraphs(
    anchor: &mut Node,
    following: &mut [&mut Node],
    address: &str,
    layout: &LayoutConstants,
) -> ReflowOutcome {
    let Some(template) = segments(anchor).first().map(|s| (*s).clone()) else {
        return ReflowOutcome {
            line_count: 0,
            shifted_paragraphs: 0,
            extent: 0,
        };
    };

    let prefix = address_prefix_len(&paragraph_text(anchor), address, &layout.label_marker);
    let base_horz_pos = attr_i64(&template, "horzpos").unwrap_or(layout.base_horz_pos);
    let base_horz_size = attr_i64(&template, "horzsize").unwrap_or(layout.base_horz_size);
    let indent = layout.hanging_indent(base_horz_size);

    let starts = wrap_address(address, layout);
    let mut lines = Vec::with_capacity(starts.len());
    let mut vert = attr_i64(&template, "vertpos").unwrap_or(0);
    for (i, start) in starts.iter().enumerate() {
        let mut seg = template.clone();
        if i == 0 {
            seg.set_attr("textpos", "0");
            seg.set_attr("horzpos", base_horz_pos.to_string());
            seg.set_attr("horzsize", base_horz_size.to_string());
        } else {
            vert += layout.line_height;
            seg.set_attr("textpos", (prefix + start).to_string());
            seg.set_attr("vertpos", vert.to_string());
            seg.set_attr("horzpos", (base_horz_pos + indent).to_string());
            seg.set_attr("horzsize", (base_horz_size - indent).to_string());
            seg.set_attr("flags", layout.continuation_flags.to_string());
        }
        lines.push(seg);
    }
    let line_count = lines.len();

    if let Some(array) = anchor.children_mut("linesegarray").into_iter().next() {
        array.replace_children("lineseg", lines);
        if array.attr("count").is_some() {
            array.set_attr("count", line_count.to_string());
        }
    }

    let extent = vert_range(anchor).map(|(_, max)| max).unwrap_or(vert) + layout.line_box_height;
    let mut cursor = extent + layout.paragraph_gap;
    let mut shifted_paragraphs = 0;
    for paragraph in following.iter_mut() {
        let paragraph = &mut **paragraph;
        let Some((min, mut max)) = vert_range(paragraph) else {
            continue;
        };
        if min < cursor {
            let delta = cursor - min;
            shift_segments(paragraph, delta);
            max += delta;
            shifted_paragraphs += 1;
        }
        cursor = max + layout.line_box_height + layout.paragraph_gap;
    }

    ReflowOutcome {
        line_count,
        shifted_paragraphs,
        extent,
    }
}

fn paragraph_has_marker(paragraph: &Node, marker: &str) -> bool {
    paragraph
        .children("run")
        .any(|run| run_text(run).contains(marker))
}

fn run_text(run: &Node) -> String {
    run.children("t").map(Node::text_content).collect()
}

fn paragraph_text(paragraph: &Node) -> String {
    paragraph.children("run").map(run_text).collect()
}

/// Characters of paragraph text in front of the address (label, colon, spacing).
fn address_prefix_len(text: &str, address: &str, marker: &str) -> usize {
    if address.is_empty() {
        return 0;
    }
    let after_marker = text.find(marker).map(|i| i + marker.len()).unwrap_or(0);
    text[after_marker..]
        .find(address)
        .map(|i| text[..after_marker + i].chars().count())
        .unwrap_or(0)
}

fn segments(paragraph: &Node) -> Vec<&Node> {
    paragraph
        .children("linesegarray")
        .flat_map(|array| array.children("lineseg"))
        .collect()
}

fn segments_mut(paragraph: &mut Node) -> Vec<&mut Node> {
    paragraph
        .children_mut("linesegarray")
        .into_iter()
        .flat_map(|array| array.children_mut("lineseg"))
        .collect()
}

fn vert_range(paragraph: &Node) -> Option<(i64, i64)> {
    let verts: Vec<i64> = segments(paragraph)
        .into_iter()
        .filter_map(|s| attr_i64(s, "vertpos"))
        .collect();
    Some((*verts.iter().min()?, *verts.iter().max()?))
}

fn shift_segments(paragraph: &mut Node, delta: i64) {
    for seg in segments_mut(paragraph) {
        if let Some(v) = attr_i64(seg, "vertpos") {
            seg.set_attr("vertpos", (v + delta).to_string());
        }
    }
}

fn attr_i64(node: &Node, name: &str) -> Option<i64> {
    node.attr(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwpx::xml::{parse_document, write_document};

    fn seg(vert: i64) -> String {
        format!(
            r#"<hp:lineseg textpos="0" vertpos="{vert}" vertsize="1000" textheight="1000" baseline="850" spacing="600" horzpos="0" horzsize="42520" flags="393216"/>"#
        )
    }

    fn para(id: u32, runs: &[&str], vert: Option<i64>) -> String {
        let runs: String = runs
            .iter()
            .map(|t| format!(r#"<hp:run charPrIDRef="0"><hp:t>{t}</hp:t></hp:run>"#))
            .collect();
        let segs = vert
            .map(|v| format!("<hp:linesegarray>{}</hp:linesegarray>", seg(v)))
            .unwrap_or_default();
        format!(r#"<hp:p id="{id}">{runs}{segs}</hp:p>"#)
    }

    fn section(paragraphs: &[String]) -> String {
        format!(
            r#"<hs:sec xmlns:hs="urn:hs" xmlns:hp="urn:hp">{}</hs:sec>"#,
            paragraphs.concat()
        )
    }

    fn small_layout() -> LayoutConstants {
        LayoutConstants {
            weight_per_line: 20.0,
            label_weight: 5.0,
            ..LayoutConstants::default()
        }
    }

    fn para_segments(root: &Node, id: &str) -> Vec<Node> {
        let sec = root.children("sec").next().expect("sec");
        let p = sec
            .children("p")
            .find(|p| p.attr("id") == Some(id))
            .expect("paragraph");
        segments(p).into_iter().cloned().collect()
    }

    fn spans(address: &str, starts: &[usize]) -> Vec<String> {
        let chars: Vec<char> = address.chars().collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let e = starts.get(i + 1).copied().unwrap_or(chars.len());
                chars[s..e].iter().collect()
            })
            .collect()
    }

    #[test]
    fn short_address_fits_one_line() {
        let starts = wrap_address("서울시", &LayoutConstants::default());
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn empty_address_is_a_single_line() {
        assert_eq!(wrap_address("", &LayoutConstants::default()), vec![0]);
    }

    #[test]
    fn backtracks_to_comma() {
        let mut address: String = "a".repeat(30);
        address.push(',');
        address.push_str(&"a".repeat(9));
        assert_eq!(address.chars().count(), 40);
        let layout = LayoutConstants {
            weight_per_line: 56.5,
            label_weight: 20.0,
            ..LayoutConstants::default()
        };
        assert_eq!(wrap_address(&address, &layout), vec![0, 31]);
    }

    #[test]
    fn hard_break_without_separator() {
        let address = "a".repeat(20);
        // 13 narrow chars per line after the label.
        assert_eq!(wrap_address(&address, &small_layout()), vec![0, 13]);
    }

    #[test]
    fn opening_bracket_starts_next_line() {
        let address = "aaaaaaaaaa(bbbbbbb)";
        let starts = wrap_address(address, &small_layout());
        assert_eq!(starts, vec![0, 10]);
        assert_eq!(spans(address, &starts), vec!["aaaaaaaaaa", "(bbbbbbb)"]);
    }

    #[test]
    fn spaces_after_break_are_skipped() {
        let address = "aaaa bbbb cccc   dddd eeee";
        let starts = wrap_address(address, &small_layout());
        for &s in &starts[1..] {
            assert_ne!(address.chars().nth(s), Some(' '));
        }
    }

    #[test]
    fn wrap_covers_text_with_increasing_offsets() {
        let layout = LayoutConstants::default();
        let addresses = [
            "서울특별시 강남구 테헤란로 123길 45, 한빛빌딩 7층 701호 (역삼동, 한빛타워) 그리고 아주 긴 주소 뒷부분",
            "경기도 성남시 분당구 판교역로 235 에이치스퀘어 엔동 7층",
            "Seoul Gangnam-gu Teheran-ro 123, Hanbit Building 7F [Unit 701], Yeoksam-dong, Republic of Korea",
            "가나다라마바사아자차카타파하가나다라마바사아자차카타파하가나다라마바사아자차카타파하",
        ];
        for address in addresses {
            let starts = wrap_address(address, &layout);
            assert_eq!(starts[0], 0);
            assert!(starts.windows(2).all(|w| w[0] < w[1]), "{starts:?}");
            let joined: String = spans(address, &starts).concat();
            assert_eq!(joined, address);
        }
    }

    #[test]
    fn long_address_rewraps_and_pushes_following_paragraphs() {
        let xml = section(&[
            para(1, &["성명: 홍길동"], Some(0)),
            para(2, &["주소지: ", "aaaa bbbb cccc dddd"], Some(1600)),
            para(3, &["용역기간: 2024"], Some(3200)),
            para(4, &["용역내용: 강의"], Some(4800)),
        ]);
        let mut root = parse_document(&xml).expect("parse");
        let outcome =
            reflow_address(&mut root, "aaaa bbbb cccc dddd", &small_layout()).expect("anchor");
        assert_eq!(
            outcome,
            ReflowOutcome {
                line_count: 2,
                shifted_paragraphs: 2,
                extent: 4200,
            }
        );

        let segs = para_segments(&root, "2");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].attr("textpos"), Some("0"));
        assert_eq!(segs[0].attr("vertpos"), Some("1600"));
        assert_eq!(segs[0].attr("horzpos"), Some("0"));
        assert_eq!(segs[0].attr("flags"), Some("393216"));
        // "주소지: " is five characters, the address breaks after "bbbb ".
        assert_eq!(segs[1].attr("textpos"), Some("15"));
        assert_eq!(segs[1].attr("vertpos"), Some("3200"));
        assert_eq!(segs[1].attr("horzpos"), Some("10630"));
        assert_eq!(segs[1].attr("horzsize"), Some("31890"));
        assert_eq!(segs[1].attr("flags"), Some("1441792"));
        assert_eq!(segs[1].attr("baseline"), Some("850"));

        assert_eq!(para_segments(&root, "1")[0].attr("vertpos"), Some("0"));
        assert_eq!(para_segments(&root, "3")[0].attr("vertpos"), Some("4800"));
        assert_eq!(para_segments(&root, "4")[0].attr("vertpos"), Some("6400"));
    }

    #[test]
    fn short_address_leaves_following_paragraphs_alone() {
        let xml = section(&[
            para(1, &["주소지: 서울시"], Some(1600)),
            para(2, &["용역기간: 2024"], Some(3200)),
            para(3, &["용역내용: 강의"], Some(4800)),
        ]);
        let mut root = parse_document(&xml).expect("parse");
        let before = write_document(&root).expect("write");
        let outcome = reflow_address(&mut root, "서울시", &LayoutConstants::default())
            .expect("anchor");
        assert_eq!(outcome.line_count, 1);
        assert_eq!(outcome.shifted_paragraphs, 0);
        assert_eq!(outcome.extent, 2600);
        assert_eq!(write_document(&root).expect("write"), before);
    }

    #[test]
    fn following_paragraphs_clear_the_address_block() {
        let xml = section(&[
            para(1, &["주소지: 가나다라마바사아자차카타파하가나다라마바사아자차카타파하가나다라마바사아자차카타파하"], Some(0)),
            para(2, &["a"], Some(1600)),
            para(3, &["b"], Some(2000)),
            para(4, &["c"], None),
            para(5, &["d"], Some(90000)),
        ]);
        let layout = LayoutConstants::default();
        let mut root = parse_document(&xml).expect("parse");
        let outcome = reflow_address(
            &mut root,
            "가나다라마바사아자차카타파하가나다라마바사아자차카타파하가나다라마바사아자차카타파하",
            &layout,
        )
        .expect("anchor");
        assert!(outcome.line_count > 1);

        let mut cursor = outcome.extent + layout.paragraph_gap;
        for id in ["2", "3", "5"] {
            let segs = para_segments(&root, id);
            let vert: i64 = segs[0].attr("vertpos").and_then(|v| v.parse().ok()).expect("vert");
            assert!(vert >= cursor, "paragraph {id} at {vert} overlaps {cursor}");
            cursor = vert + layout.line_box_height + layout.paragraph_gap;
        }
        assert_eq!(para_segments(&root, "5")[0].attr("vertpos"), Some("90000"));
    }

    #[test]
    fn missing_marker_is_a_no_op() {
        let xml = section(&[para(1, &["성명: 홍길동"], Some(0)), para(2, &["서울시"], Some(1600))]);
        let mut root = parse_document(&xml).expect("parse");
        let before = root.clone();
        assert_eq!(reflow_address(&mut root, "대전시", &LayoutConstants::default()), None);
        assert_eq!(root, before);
    }

    #[test]
    fn anchor_without_segments_changes_nothing() {
        let xml = section(&[para(1, &["주소지: 서울시"], None), para(2, &["x"], Some(0))]);
        let mut root = parse_document(&xml).expect("parse");
        let before = root.clone();
        let outcome = reflow_address(&mut root, "서울시", &LayoutConstants::default())
            .expect("anchor");
        assert_eq!(outcome.line_count, 0);
        assert_eq!(root, before);
    }

    #[test]
    fn finds_address_inside_table_cell() {
        let anchor = para(7, &["주소지: aaaa bbbb cccc dddd"], Some(0));
        let cell = format!(
            "<hp:tbl><hp:tr><hp:tc><hp:subList>{anchor}</hp:subList></hp:tc></hp:tr></hp:tbl>"
        );
        let xml = section(&[format!(r#"<hp:p id="1"><hp:run>{cell}</hp:run></hp:p>"#)]);
        let mut root = parse_document(&xml).expect("parse");
        let outcome =
            reflow_address(&mut root, "aaaa bbbb cccc dddd", &small_layout()).expect("anchor");
        assert_eq!(outcome.line_count, 2);
        let out = write_document(&root).expect("write");
        assert!(out.contains(r#"textpos="15""#));
    }
}
