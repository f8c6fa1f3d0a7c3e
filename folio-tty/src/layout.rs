use folio_core::{Point, Rect, Size};

/// Cell size assumed when the terminal does not report its pixel dimensions.
const FALLBACK_CELL: Size = Size {
    width: 8.0,
    height: 16.0,
};

/// Terminal grid measured in cells and pixels. The last row holds the status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenLayout {
    pub columns: u16,
    pub rows: u16,
    pub cell: Size,
}

/// Where the visible slice of the raster goes on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub column: u16,
    pub row: u16,
    pub columns: u32,
    pub rows: u32,
    /// Visible part of the raster, in raster pixels.
    pub source: Rect,
}

impl ScreenLayout {
    pub fn from_window(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let cell = if pixel_width > 0 && pixel_height > 0 {
            Size::new(
                f32::from(pixel_width) / f32::from(columns),
                f32::from(pixel_height) / f32::from(rows),
            )
        } else {
            FALLBACK_CELL
        };
        Self {
            columns,
            rows,
            cell,
        }
    }

    pub fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    /// Client-space rectangle available to the page, above the status line.
    pub fn page_area(&self) -> Rect {
        let page_rows = self.rows.saturating_sub(1).max(1);
        Rect::new(
            0.0,
            0.0,
            f32::from(self.columns) * self.cell.width,
            f32::from(page_rows) * self.cell.height,
        )
    }

    /// Client-space pixel at the middle of a cell.
    pub fn cell_center(&self, column: u16, row: u16) -> Point {
        Point::new(
            (f32::from(column) + 0.5) * self.cell.width,
            (f32::from(row) + 0.5) * self.cell.height,
        )
    }

    /// Centres a raster of `display` size horizontally, snapped to whole cells.
    pub fn raster_origin(&self, display: Size) -> Point {
        let spare = (self.page_area().width - display.width).max(0.0);
        let columns = (spare / 2.0 / self.cell.width).floor();
        Point::new(columns * self.cell.width, 0.0)
    }

    /// Slice of a raster at `origin` (container space) visible through the page area
    /// scrolled by `scroll`, or `None` when the raster is scrolled out of view.
    pub fn placement(&self, origin: Point, display: Size, scroll: Point) -> Option<Placement> {
        let area = self.page_area();
        let left = origin.x.max(scroll.x);
        let top = origin.y.max(scroll.y);
        let right = (origin.x + display.width).min(scroll.x + area.width);
        let bottom = (origin.y + display.height).min(scroll.y + area.height);
        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        let client_x = area.x + left - scroll.x;
        let client_y = area.y + top - scroll.y;
        let max_rows = u32::from(self.rows.saturating_sub(1).max(1));
        Some(Placement {
            column: (client_x / self.cell.width).floor() as u16,
            row: (client_y / self.cell.height).floor() as u16,
            columns: ((right - left) / self.cell.width).round().max(1.0) as u32,
            rows: (((bottom - top) / self.cell.height).round().max(1.0) as u32).min(max_rows),
            source: Rect::new(left - origin.x, top - origin.y, right - left, bottom - top),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_size_comes_from_pixel_dimensions() {
        let layout = ScreenLayout::from_window(100, 41, 1000, 820);
        assert_eq!(layout.cell, Size::new(10.0, 20.0));
        assert_eq!(layout.page_area(), Rect::new(0.0, 0.0, 1000.0, 800.0));
        assert_eq!(layout.status_row(), 40);
        assert_eq!(layout.cell_center(3, 2), Point::new(35.0, 50.0));
    }

    #[test]
    fn unknown_pixel_size_falls_back_to_default_cells() {
        let layout = ScreenLayout::from_window(80, 25, 0, 0);
        assert_eq!(layout.cell, FALLBACK_CELL);
    }

    #[test]
    fn narrow_raster_is_centred_on_cell_boundary() {
        let layout = ScreenLayout::from_window(100, 41, 1000, 820);
        let origin = layout.raster_origin(Size::new(575.0, 900.0));
        assert_eq!(origin, Point::new(210.0, 0.0));
        assert_eq!(layout.raster_origin(Size::new(1500.0, 900.0)), Point::ORIGIN);
    }

    #[test]
    fn placement_crops_to_the_scrolled_viewport() {
        let layout = ScreenLayout::from_window(100, 41, 1000, 820);
        let placement = layout
            .placement(Point::ORIGIN, Size::new(1200.0, 1600.0), Point::new(100.0, 400.0))
            .unwrap();
        assert_eq!((placement.column, placement.row), (0, 0));
        assert_eq!((placement.columns, placement.rows), (100, 40));
        assert_eq!(placement.source, Rect::new(100.0, 400.0, 1000.0, 800.0));
    }

    #[test]
    fn placement_keeps_the_centring_offset() {
        let layout = ScreenLayout::from_window(100, 41, 1000, 820);
        let origin = Point::new(200.0, 0.0);
        let placement = layout
            .placement(origin, Size::new(600.0, 300.0), Point::ORIGIN)
            .unwrap();
        assert_eq!((placement.column, placement.row), (20, 0));
        assert_eq!((placement.columns, placement.rows), (60, 15));
        assert_eq!(placement.source, Rect::new(0.0, 0.0, 600.0, 300.0));
    }

    #[test]
    fn raster_scrolled_out_of_view_has_no_placement() {
        let layout = ScreenLayout::from_window(100, 41, 1000, 820);
        assert!(layout
            .placement(Point::ORIGIN, Size::new(100.0, 100.0), Point::new(0.0, 200.0))
            .is_none());
    }
}
