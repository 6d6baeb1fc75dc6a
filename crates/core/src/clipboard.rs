use crate::selection::Selection;
use inkpage_model::{Image, Offset, PageId, Stroke};

/// Copied content, stored relative to the viewport it was copied from
///
/// Pasting places the content at the same screen position under the current
/// scroll, on whichever page is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    strokes: Vec<Stroke>,
    images: Vec<Image>,
}

impl Clipboard {
    pub fn copy(selection: &Selection, scroll: Offset) -> Self {
        let back = -scroll;
        Self {
            strokes: selection.strokes.iter().map(|s| s.translated(back)).collect(),
            images: selection.images.iter().map(|i| i.translated(back)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.images.is_empty()
    }

    /// Fresh copies for `page_id`, shifted by `scroll`
    ///
    /// Every call yields new ids, so the same clipboard can be pasted
    /// repeatedly.
    pub fn paste(&self, page_id: PageId, scroll: Offset) -> Selection {
        let strokes = self
            .strokes
            .iter()
            .map(|s| Stroke {
                page_id,
                ..s.translated(scroll)
            })
            .collect();
        let images = self
            .images
            .iter()
            .map(|i| Image {
                page_id,
                ..i.translated(scroll)
            })
            .collect();
        Selection::new(page_id, strokes, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpage_model::{Color, Pen, StrokePoint};

    #[test]
    fn test_paste_follows_scroll_and_page() {
        let source = uuid::Uuid::new_v4();
        let target = uuid::Uuid::new_v4();
        let stroke = Stroke::new(
            source,
            Pen::Ballpen,
            2.0,
            Color::BLACK,
            vec![StrokePoint::new(10.0, 510.0), StrokePoint::new(20.0, 520.0)],
        );
        let selection = Selection::new(source, vec![stroke.clone()], vec![]);
        let clipboard = Clipboard::copy(&selection, Offset::new(0.0, 500.0));

        let first = clipboard.paste(target, Offset::new(0.0, 100.0));
        let pasted = &first.strokes[0];
        assert_eq!(pasted.page_id, target);
        assert_eq!((pasted.points[0].x, pasted.points[0].y), (10.0, 110.0));
        assert_ne!(pasted.id, stroke.id);

        let second = clipboard.paste(target, Offset::new(0.0, 100.0));
        assert_ne!(second.strokes[0].id, pasted.id);
    }

    #[test]
    fn test_empty() {
        assert!(Clipboard::default().is_empty());
    }
}
