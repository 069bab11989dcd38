use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementMargins {
    pub padding: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementSide {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToolbarPlacement {
    pub top_left: Point,
    pub side: PlacementSide,
}

/// Positions the floating toolbar centered above `anchor`, flipping below it
/// when there is not enough room above, then clamps the result so the toolbar
/// stays inside the viewport with `margins.padding` on every side.
///
/// When the toolbar is larger than the viewport on an axis, that axis is
/// pinned to `padding`.
pub fn place_toolbar(
    anchor: Point,
    toolbar: Size,
    viewport: Size,
    margins: PlacementMargins,
) -> ToolbarPlacement {
    let padding = sanitize(margins.padding);
    let gap = sanitize(margins.gap);
    let width = sanitize(toolbar.width);
    let height = sanitize(toolbar.height);
    let anchor_x = if anchor.x.is_finite() { anchor.x } else { 0.0 };
    let anchor_y = if anchor.y.is_finite() { anchor.y } else { 0.0 };

    let preferred_left = anchor_x - width / 2.0;
    let above_top = anchor_y - gap - height;
    let (preferred_top, side) = if above_top >= padding {
        (above_top, PlacementSide::Above)
    } else {
        (anchor_y + gap, PlacementSide::Below)
    };

    ToolbarPlacement {
        top_left: Point::new(
            clamp_axis(preferred_left, width, sanitize(viewport.width), padding),
            clamp_axis(preferred_top, height, sanitize(viewport.height), padding),
        ),
        side,
    }
}

fn clamp_axis(position: f64, extent: f64, viewport_extent: f64, padding: f64) -> f64 {
    let max = viewport_extent - extent - padding;
    if max < padding {
        return padding;
    }
    position.clamp(padding, max)
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGINS: PlacementMargins = PlacementMargins {
        padding: 8.0,
        gap: 10.0,
    };
    const TOOLBAR: Size = Size {
        width: 200.0,
        height: 40.0,
    };
    const VIEWPORT: Size = Size {
        width: 1024.0,
        height: 768.0,
    };

    #[test]
    fn prefers_centered_above_anchor() {
        let placement = place_toolbar(Point::new(500.0, 300.0), TOOLBAR, VIEWPORT, MARGINS);
        assert_eq!(placement.side, PlacementSide::Above);
        assert_eq!(placement.top_left, Point::new(400.0, 250.0));
    }

    #[test]
    fn flips_below_when_no_room_above() {
        let placement = place_toolbar(Point::new(500.0, 30.0), TOOLBAR, VIEWPORT, MARGINS);
        assert_eq!(placement.side, PlacementSide::Below);
        assert_eq!(placement.top_left, Point::new(400.0, 40.0));
    }

    #[test]
    fn clamps_horizontally_near_edges() {
        let left = place_toolbar(Point::new(5.0, 300.0), TOOLBAR, VIEWPORT, MARGINS);
        assert_eq!(left.top_left.x, 8.0);

        let right = place_toolbar(Point::new(1020.0, 300.0), TOOLBAR, VIEWPORT, MARGINS);
        assert_eq!(right.top_left.x, 1024.0 - 200.0 - 8.0);
    }

    #[test]
    fn clamps_vertically_when_anchor_is_below_viewport() {
        let placement = place_toolbar(Point::new(500.0, 5_000.0), TOOLBAR, VIEWPORT, MARGINS);
        assert_eq!(placement.top_left.y, 768.0 - 40.0 - 8.0);
    }

    #[test]
    fn never_leaves_the_padded_viewport() {
        let anchors = [-500.0, -1.0, 0.0, 3.0, 100.0, 511.0, 760.0, 1024.0, 4_000.0];
        for &x in &anchors {
            for &y in &anchors {
                let placement = place_toolbar(Point::new(x, y), TOOLBAR, VIEWPORT, MARGINS);
                let Point { x: left, y: top } = placement.top_left;
                assert!((8.0..=1024.0 - 200.0 - 8.0).contains(&left), "x={x} y={y} left={left}");
                assert!((8.0..=768.0 - 40.0 - 8.0).contains(&top), "x={x} y={y} top={top}");
            }
        }
    }

    #[test]
    fn oversized_toolbar_is_pinned_to_padding() {
        let placement = place_toolbar(
            Point::new(100.0, 100.0),
            Size::new(2_000.0, 40.0),
            VIEWPORT,
            MARGINS,
        );
        assert_eq!(placement.top_left.x, 8.0);
    }

    #[test]
    fn non_finite_anchor_still_lands_on_screen() {
        let placement = place_toolbar(Point::new(f64::NAN, f64::INFINITY), TOOLBAR, VIEWPORT, MARGINS);
        assert!(placement.top_left.x.is_finite());
        assert!(placement.top_left.y >= 8.0);
    }
}
