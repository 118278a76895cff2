//! Destructive text removal on decoded content streams
//!
//! The text-showing operators that drew a redacted fragment are replaced by
//! a `TJ` that only moves the pen by the same amount, so text shown later in
//! the same text object stays where it was. Line-advancing variants keep
//! their line move. Other text is left alone even where it overlaps a
//! region. The regions are then painted with their fill color.

use std::collections::HashMap;

use lopdf::content::Operation;
use lopdf::Object;

use crate::annotator::RedactionRegion;
use crate::geometry::PageBox;
use crate::layout::ShownText;

/// Rewrite `operations`, dropping the glyphs of every shown text a region
/// names. Returns the new operations and how many operators were erased.
pub fn erase_text(
    operations: Vec<Operation>,
    shown: &[ShownText],
    regions: &[RedactionRegion],
) -> (Vec<Operation>, usize) {
    let targets: HashMap<usize, &ShownText> = shown
        .iter()
        .filter(|s| regions.iter().any(|r| covers(r, s)))
        .map(|s| (s.op_index, s))
        .collect();
    if targets.is_empty() {
        return (operations, 0);
    }

    let mut out = Vec::with_capacity(operations.len() + targets.len());
    for (index, op) in operations.into_iter().enumerate() {
        match targets.get(&index) {
            Some(target) => out.extend(blank_operator(op, target)),
            None => out.push(op),
        }
    }
    (out, targets.len())
}

fn covers(region: &RedactionRegion, shown: &ShownText) -> bool {
    if region.operators.is_empty() {
        region.rect.contains(&shown.rect)
    } else {
        region.operators.contains(&shown.op_index)
    }
}

/// Operators that reproduce `op`'s state changes and pen movement without marks.
fn blank_operator(op: Operation, shown: &ShownText) -> Vec<Operation> {
    let mut replacement = Vec::new();
    match op.operator.as_str() {
        "'" => replacement.push(Operation::new("T*", vec![])),
        "\"" => {
            let mut operands = op.operands.into_iter();
            if let Some(aw) = operands.next() {
                replacement.push(Operation::new("Tw", vec![aw]));
            }
            if let Some(ac) = operands.next() {
                replacement.push(Operation::new("Tc", vec![ac]));
            }
            replacement.push(Operation::new("T*", vec![]));
        }
        _ => {}
    }

    let adjustment = if shown.horizontal_scale.abs() > f64::EPSILON {
        -shown.advance * 1000.0 / shown.horizontal_scale
    } else {
        0.0
    };
    let spacer = if adjustment.abs() > f64::EPSILON {
        vec![Object::Real(adjustment as f32)]
    } else {
        vec![]
    };
    replacement.push(Operation::new("TJ", vec![Object::Array(spacer)]));
    replacement
}

/// Painting operators that fill each region, isolated in their own `q`/`Q`.
pub fn fill_operations(regions: &[RedactionRegion], page_box: &PageBox) -> Vec<Operation> {
    if regions.is_empty() {
        return Vec::new();
    }
    let mut ops = vec![Operation::new("q", vec![])];
    for region in regions {
        let (x, y, w, h) = page_box.rect_to_user_space(&region.rect);
        let color = region.fill;
        ops.push(Operation::new(
            "rg",
            vec![real(color.0), real(color.1), real(color.2)],
        ));
        ops.push(Operation::new("re", vec![real(x), real(y), real(w), real(h)]));
        ops.push(Operation::new("f", vec![]));
    }
    ops.push(Operation::new("Q", vec![]));
    ops
}

pub(crate) fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Color, Rect};
    use crate::layout::{group_fragments, number, PageFonts, TextScanner};
    use lopdf::content::Content;
    use pretty_assertions::assert_eq;

    fn decode(content: &str) -> Vec<Operation> {
        Content::decode(content.as_bytes()).unwrap().operations
    }

    fn scan(ops: &[Operation]) -> Vec<ShownText> {
        let fonts = PageFonts::default();
        TextScanner::new(&fonts, PageBox::LETTER).scan(ops)
    }

    fn region(x0: f64, y0: f64, x1: f64, y1: f64) -> RedactionRegion {
        RedactionRegion {
            rect: Rect::new(x0, y0, x1, y1),
            fill: Color::WHITE,
            operators: Vec::new(),
        }
    }

    #[test]
    fn test_erases_only_text_inside_region() {
        let ops = decode("BT /F1 10 Tf 100 700 Td (123) Tj ET BT /F1 10 Tf 540 40 Td (7) Tj ET");
        let shown = scan(&ops);
        let (out, erased) = erase_text(ops, &shown, &[region(539.0, 743.0, 546.0, 755.0)]);
        assert_eq!(erased, 1);

        let after = scan(&out);
        let texts: Vec<&str> = after.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["123"]);
    }

    #[test]
    fn test_following_text_keeps_position() {
        let ops = decode("BT /F1 10 Tf 540 40 Td (12) Tj (ab) Tj ET");
        let shown = scan(&ops);
        let before = shown[1].rect;
        let (out, erased) = erase_text(ops, &shown, &[region(539.0, 743.0, 551.0, 755.0)]);
        assert_eq!(erased, 1);

        let after = scan(&out);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].text, "ab");
        assert!((after[0].rect.x0 - before.x0).abs() < 1e-3);
        assert!((after[0].rect.x1 - before.x1).abs() < 1e-3);
    }

    #[test]
    fn test_quote_keeps_line_advance() {
        let ops = decode("BT /F1 10 Tf 12 TL 540 52 Td (x) Tj (4) ' (y) Tj ET");
        let shown = scan(&ops);
        let y_line = shown[2].rect;
        let (out, _) = erase_text(ops, &shown, &[region(539.0, 743.0, 546.0, 755.0)]);

        let after = scan(&out);
        let texts: Vec<&str> = after.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "y"]);
        assert!((after[1].rect.x0 - y_line.x0).abs() < 1e-3);
        assert!((after[1].baseline - 752.0).abs() < 1e-3);
    }

    #[test]
    fn test_double_quote_keeps_spacing_state() {
        let ops = decode("BT /F1 10 Tf 12 TL 540 52 Td 1 2 (9) \" (z) Tj ET");
        let shown = scan(&ops);
        let z_before = shown[1].rect;
        let (out, erased) = erase_text(ops, &shown, &[region(539.0, 743.0, 546.0, 755.0)]);
        assert_eq!(erased, 1);
        assert!(out.iter().any(|op| op.operator == "Tw"));
        assert!(out.iter().any(|op| op.operator == "Tc"));

        let after = scan(&out);
        assert_eq!(after.len(), 1);
        assert!((after[0].rect.x0 - z_before.x0).abs() < 1e-3);
    }

    #[test]
    fn test_overlapping_neighbour_line_survives() {
        // The footnote's box reaches 1pt into the page number's box
        let footnote = "x".repeat(100);
        let content = format!(
            "BT /F1 10 Tf 72 49 Td ({}) Tj ET BT /F1 10 Tf 540 40 Td (7) Tj ET",
            footnote
        );
        let ops = decode(&content);
        let shown = scan(&ops);
        let fragments = group_fragments(&shown);
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].rect.x1 > fragments[1].rect.x0);
        assert!(fragments[0].rect.y1 > fragments[1].rect.y0);

        let number = &fragments[1];
        let by_operator = RedactionRegion {
            rect: number.rect,
            fill: Color::WHITE,
            operators: number.operators.clone(),
        };
        let by_area = RedactionRegion {
            operators: Vec::new(),
            ..by_operator.clone()
        };
        for regions in [vec![by_operator], vec![by_area]] {
            let (out, erased) = erase_text(ops.clone(), &shown, &regions);
            assert_eq!(erased, 1);
            let texts: Vec<String> = scan(&out).into_iter().map(|s| s.text).collect();
            assert_eq!(texts, vec![footnote.clone()]);
        }
    }

    #[test]
    fn test_named_operators_are_erased_wherever_they_sit() {
        let ops = decode("BT /F1 10 Tf 540 40 Td (1) Tj (2) Tj ET BT /F1 10 Tf 540 60 Td (9) Tj ET");
        let shown = scan(&ops);
        let named = RedactionRegion {
            operators: vec![shown[0].op_index, shown[1].op_index],
            ..region(0.0, 0.0, 1.0, 1.0)
        };
        let (out, erased) = erase_text(ops, &shown, &[named]);
        assert_eq!(erased, 2);
        let texts: Vec<String> = scan(&out).into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["9".to_string()]);
    }

    #[test]
    fn test_no_regions_leaves_stream_untouched() {
        let ops = decode("BT /F1 10 Tf 540 40 Td (7) Tj ET");
        let shown = scan(&ops);
        let (out, erased) = erase_text(ops.clone(), &shown, &[]);
        assert_eq!(erased, 0);
        assert_eq!(out.len(), ops.len());
    }

    #[test]
    fn test_fill_operations_in_user_space() {
        let ops = fill_operations(&[region(540.0, 744.0, 545.0, 754.0)], &PageBox::LETTER);
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "rg", "re", "f", "Q"]);
        let rect: Vec<f64> = ops[2].operands.iter().filter_map(number).collect();
        assert_eq!(rect, vec![540.0, 38.0, 5.0, 10.0]);
        assert!(fill_operations(&[], &PageBox::LETTER).is_empty());
    }
}
