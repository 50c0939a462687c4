//! The scrollback scrollbar: geometry, drag state, and flush diffing.

use std::io;

use vtwire::{CompositeOp, Instruction, InstructionSink, LayerId, Rgb};

use crate::input::MouseButtons;

/// The width of the scrollbar container, in pixels.
pub(crate) const SCROLLBAR_WIDTH: i32 = 16;

/// Padding between the container edge and the handle, in pixels.
const SCROLLBAR_PADDING: i32 = 2;

/// The minimum height of the handle, in pixels.
const SCROLLBAR_MIN_HEIGHT: i32 = 64;

/// The opacity of the scrollbar as a whole (40%).
const SCROLLBAR_OPACITY: u8 = 0x66;

const HANDLE_COLOR: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
const CONTAINER_COLOR: Rgb = Rgb::new(0x80, 0x80, 0x80);

/// Positions and sizes of the container and handle as last rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RenderState {
    handle_x: i32,
    handle_y: i32,
    handle_width: i32,
    handle_height: i32,
    container_x: i32,
    container_y: i32,
    container_width: i32,
    container_height: i32,
}

/// A vertical scrollbar anchored to the right edge of its parent layer.
///
/// The scrollbar's value ranges over `[min, max]`; for terminal scrollback
/// the minimum is negative (rows above the live view) and the maximum 0.
#[derive(Debug)]
pub(crate) struct Scrollbar {
    container: LayerId,
    handle: LayerId,
    parent: LayerId,
    min: i32,
    max: i32,
    value: i32,
    parent_width: i32,
    parent_height: i32,
    visible_area: i32,
    render_state: RenderState,
    rendered: bool,
    dragging_handle: bool,
    drag_offset_y: i32,
    drag_current_y: i32,
}

impl Scrollbar {
    pub(crate) fn new(
        container: LayerId,
        handle: LayerId,
        parent: LayerId,
        parent_width: i32,
        parent_height: i32,
        visible_area: i32,
    ) -> Self {
        Self {
            container,
            handle,
            parent,
            min: 0,
            max: 0,
            value: 0,
            parent_width,
            parent_height,
            visible_area,
            render_state: RenderState::default(),
            rendered: false,
            dragging_handle: false,
            drag_offset_y: 0,
            drag_current_y: 0,
        }
    }

    pub(crate) fn value(&self) -> i32 {
        self.value
    }

    /// Update the value range, fitting the current value into it. The
    /// bounds may be momentarily inverted (an empty buffer on a taller
    /// display); the range then behaves as empty.
    pub(crate) fn set_bounds(&mut self, min: i32, max: i32) {
        if self.value > max {
            self.value = max;
        } else if self.value < min {
            self.value = min;
        }
        self.min = min;
        self.max = max;
    }

    /// Set the current value, fitted within the bounds.
    pub(crate) fn set_value(&mut self, value: i32) {
        self.value = if value > self.max {
            self.max
        } else if value < self.min {
            self.min
        } else {
            value
        };
    }

    pub(crate) fn parent_resized(
        &mut self,
        parent_width: i32,
        parent_height: i32,
        visible_area: i32,
    ) {
        self.parent_width = parent_width;
        self.parent_height = parent_height;
        self.visible_area = visible_area;
    }

    /// Compute the geometry implied by the current bounds, value, and drag
    /// state, along with the value the geometry corresponds to (which
    /// differs from the current value while the handle is being dragged).
    fn calculate_state(&self) -> (RenderState, i32) {
        let mut state = RenderState {
            container_width: SCROLLBAR_WIDTH,
            container_height: self.parent_height,
            container_x: self.parent_width - SCROLLBAR_WIDTH,
            container_y: 0,
            handle_width: SCROLLBAR_WIDTH - SCROLLBAR_PADDING * 2,
            ..RenderState::default()
        };
        let mut value = self.value;

        let max_handle_height = state.container_height - SCROLLBAR_PADDING * 2;

        let scroll_delta = (self.max - self.min).max(0);

        // Scale the handle relative to visible area vs. total scrolling
        // region, with a floor so it remains grabbable
        let proportional_height = if scroll_delta + self.visible_area > 0 {
            max_handle_height * self.visible_area / (scroll_delta + self.visible_area)
        } else {
            max_handle_height
        };
        state.handle_height = proportional_height
            .max(SCROLLBAR_MIN_HEIGHT)
            .min(max_handle_height);

        state.handle_x = SCROLLBAR_PADDING;

        let min_handle_y = SCROLLBAR_PADDING;
        let max_handle_y = min_handle_y + max_handle_height - state.handle_height;

        if self.dragging_handle {
            let dragged = (self.drag_current_y - self.drag_offset_y)
                .clamp(min_handle_y, max_handle_y.max(min_handle_y));
            state.handle_y = dragged;

            if max_handle_y > min_handle_y {
                value = self.min
                    + (dragged - min_handle_y) * scroll_delta / (max_handle_y - min_handle_y);
            }
        } else if scroll_delta > 0 {
            state.handle_y = min_handle_y
                + (max_handle_y - min_handle_y) * (self.value - self.min) / scroll_delta;
        } else {
            state.handle_y = SCROLLBAR_PADDING;
        }

        (state, value)
    }

    /// Render any geometry changes, returning the new value if user
    /// interaction moved the handle. The caller applies the value change
    /// and then records it with [`Scrollbar::set_value`].
    pub(crate) fn flush(
        &mut self,
        sink: &mut dyn InstructionSink,
    ) -> io::Result<Option<i32>> {
        let (new_state, new_value) = self.calculate_state();
        let old_state = self.render_state;

        let scrolled = (new_value != self.value).then_some(new_value);

        let force = !self.rendered;

        if force
            || old_state.container_x != new_state.container_x
            || old_state.container_y != new_state.container_y
        {
            sink.send(Instruction::Move {
                layer: self.container,
                parent: self.parent,
                x: new_state.container_x,
                y: new_state.container_y,
                z: 2,
            })?;
        }

        if force
            || old_state.container_width != new_state.container_width
            || old_state.container_height != new_state.container_height
        {
            sink.send(Instruction::Size {
                layer: self.container,
                width: new_state.container_width,
                height: new_state.container_height,
            })?;
            sink.send(Instruction::Rect {
                layer: self.container,
                x: 0,
                y: 0,
                width: new_state.container_width,
                height: new_state.container_height,
            })?;
            sink.send(Instruction::Cfill {
                op: CompositeOp::Src,
                layer: self.container,
                color: CONTAINER_COLOR,
                alpha: 0xFF,
            })?;
            sink.send(Instruction::Shade {
                layer: self.container,
                opacity: SCROLLBAR_OPACITY,
            })?;
        }

        if force
            || old_state.handle_x != new_state.handle_x
            || old_state.handle_y != new_state.handle_y
        {
            sink.send(Instruction::Move {
                layer: self.handle,
                parent: self.container,
                x: new_state.handle_x,
                y: new_state.handle_y,
                z: 1,
            })?;
        }

        if force
            || old_state.handle_width != new_state.handle_width
            || old_state.handle_height != new_state.handle_height
        {
            sink.send(Instruction::Size {
                layer: self.handle,
                width: new_state.handle_width,
                height: new_state.handle_height,
            })?;
            sink.send(Instruction::Rect {
                layer: self.handle,
                x: 0,
                y: 0,
                width: new_state.handle_width,
                height: new_state.handle_height,
            })?;
            sink.send(Instruction::Cfill {
                op: CompositeOp::Src,
                layer: self.handle,
                color: HANDLE_COLOR,
                alpha: 0xFF,
            })?;
        }

        self.render_state = new_state;
        self.rendered = true;

        Ok(scrolled)
    }

    /// Process a mouse event. Returns whether the event was consumed by
    /// the scrollbar (and must not reach terminal selection logic).
    pub(crate) fn handle_mouse(&mut self, x: i32, y: i32, mask: MouseButtons) -> bool {
        let state = &self.render_state;

        let container_left = state.container_x;
        let container_top = state.container_y;
        let container_right = container_left + state.container_width;
        let container_bottom = container_top + state.container_height;

        let handle_left = container_left + state.handle_x;
        let handle_top = container_top + state.handle_y;
        let handle_right = handle_left + state.handle_width;
        let handle_bottom = handle_top + state.handle_height;

        if self.dragging_handle {
            if mask.contains(MouseButtons::LEFT) {
                self.drag_current_y = y;
            } else {
                self.dragging_handle = false;
            }
            return true;
        }

        if mask == MouseButtons::LEFT
            && x >= handle_left
            && x < handle_right
            && y >= handle_top
            && y < handle_bottom
        {
            self.dragging_handle = true;
            self.drag_offset_y = y - handle_top;
            self.drag_current_y = y;
            return true;
        }

        // Eat any events that occur within the scrollbar
        x >= container_left && x < container_right && y >= container_top && y < container_bottom
    }

    /// Repaint the scrollbar in full for a newly-joined viewer.
    pub(crate) fn sync_full(&self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        let state = &self.render_state;

        sink.send(Instruction::Move {
            layer: self.container,
            parent: self.parent,
            x: state.container_x,
            y: state.container_y,
            z: 2,
        })?;
        sink.send(Instruction::Size {
            layer: self.container,
            width: state.container_width,
            height: state.container_height,
        })?;
        sink.send(Instruction::Rect {
            layer: self.container,
            x: 0,
            y: 0,
            width: state.container_width,
            height: state.container_height,
        })?;
        sink.send(Instruction::Cfill {
            op: CompositeOp::Src,
            layer: self.container,
            color: CONTAINER_COLOR,
            alpha: 0xFF,
        })?;
        sink.send(Instruction::Shade {
            layer: self.container,
            opacity: SCROLLBAR_OPACITY,
        })?;

        sink.send(Instruction::Move {
            layer: self.handle,
            parent: self.container,
            x: state.handle_x,
            y: state.handle_y,
            z: 1,
        })?;
        sink.send(Instruction::Size {
            layer: self.handle,
            width: state.handle_width,
            height: state.handle_height,
        })?;
        sink.send(Instruction::Rect {
            layer: self.handle,
            x: 0,
            y: 0,
            width: state.handle_width,
            height: state.handle_height,
        })?;
        sink.send(Instruction::Cfill {
            op: CompositeOp::Src,
            layer: self.handle,
            color: HANDLE_COLOR,
            alpha: 0xFF,
        })
    }
}
