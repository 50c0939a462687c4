//! The shared mouse cursor sprite, mirrored to every connected viewer.

use std::collections::HashMap;
use std::io;

use vtwire::{CompositeOp, Instruction, InstructionSink, LayerId, Rgb};

/// Stock cursor sprites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorSprite {
    /// Invisible (shown while typing).
    Blank,
    /// Text i-bar (over the terminal area).
    IBar,
    /// Arrow pointer (over the scrollbar).
    Pointer,
}

impl CursorSprite {
    /// Sprite geometry: (hotspot x, hotspot y, width, height).
    fn geometry(self) -> (i32, i32, i32, i32) {
        match self {
            CursorSprite::Blank => (0, 0, 1, 1),
            CursorSprite::IBar => (3, 8, 7, 16),
            CursorSprite::Pointer => (0, 0, 11, 16),
        }
    }
}

/// Shared cursor state: the active sprite and the last pointer position of
/// each connected user.
#[derive(Debug)]
pub(crate) struct SharedCursor {
    layer: LayerId,
    sprite: CursorSprite,
    drawn: Option<CursorSprite>,
    users: HashMap<u64, (i32, i32)>,
}

impl SharedCursor {
    pub(crate) fn new(layer: LayerId) -> Self {
        Self {
            layer,
            sprite: CursorSprite::Blank,
            drawn: None,
            users: HashMap::new(),
        }
    }

    pub(crate) fn sprite(&self) -> CursorSprite {
        self.sprite
    }

    /// Request a sprite change; no-op if already current.
    pub(crate) fn set_sprite(
        &mut self,
        sprite: CursorSprite,
        sink: &mut dyn InstructionSink,
    ) -> io::Result<()> {
        self.sprite = sprite;
        if self.drawn == Some(sprite) {
            return Ok(());
        }
        self.drawn = Some(sprite);

        let (hotspot_x, hotspot_y, width, height) = sprite.geometry();

        // Draw the sprite into its source layer, then point the remote
        // cursor at it
        sink.send(Instruction::Size {
            layer: self.layer,
            width,
            height,
        })?;
        sink.send(Instruction::Rect {
            layer: self.layer,
            x: 0,
            y: 0,
            width,
            height,
        })?;
        let (color, alpha) = match sprite {
            CursorSprite::Blank => (Rgb::new(0, 0, 0), 0x00),
            CursorSprite::IBar => (Rgb::new(0xFF, 0xFF, 0xFF), 0xFF),
            CursorSprite::Pointer => (Rgb::new(0xFF, 0xFF, 0xFF), 0xFF),
        };
        sink.send(Instruction::Cfill {
            op: CompositeOp::Src,
            layer: self.layer,
            color,
            alpha,
        })?;
        sink.send(Instruction::Cursor {
            hotspot_x,
            hotspot_y,
            src: self.layer,
            src_x: 0,
            src_y: 0,
            width,
            height,
        })
    }

    /// Record and broadcast a user's pointer position.
    pub(crate) fn move_user(
        &mut self,
        user_id: u64,
        x: i32,
        y: i32,
        sink: &mut dyn InstructionSink,
    ) -> io::Result<()> {
        self.users.insert(user_id, (x, y));
        sink.send(Instruction::PointerPosition { user_id, x, y })
    }

    /// Forget a departed user. Must be called explicitly when a user
    /// leaves the session; positions are never reaped implicitly.
    pub(crate) fn remove_user(&mut self, user_id: u64) {
        self.users.remove(&user_id);
    }

    /// Replay the sprite and all known pointer positions for a
    /// newly-joined viewer.
    pub(crate) fn sync_full(&mut self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        let sprite = self.sprite;
        self.drawn = None;
        self.set_sprite(sprite, sink)?;
        for (&user_id, &(x, y)) in &self.users {
            sink.send(Instruction::PointerPosition { user_id, x, y })?;
        }
        Ok(())
    }
}
