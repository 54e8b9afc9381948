//! Keyboard snapshot with both level-triggered and edge-triggered queries.
//!
//! - **Level-triggered:** `is_held(key)` is true every frame the key is down.
//!   Camera movement reads this once per tick.
//!
//! - **Edge-triggered:** each key remembers its `last_transition`. The main loop
//!   clears transitions with `end_frame()` only after at least one tick has
//!   consumed them, so a press landing on a frame with zero ticks is not lost.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    Up,
    Down,
    Left,
    Right,
    Escape,
    Q,
    F1,
    R,
}

impl Key {
    pub const COUNT: usize = 12;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    #[default]
    None,
    Pressed,
    Released,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub is_pressed: bool,
    pub last_transition: Transition,
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: [KeyState; Key::COUNT],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// OS key-repeat delivers repeated downs; only the first one is a transition.
    pub fn key_down(&mut self, key: Key) {
        let state = &mut self.keys[key.index()];
        if !state.is_pressed {
            state.is_pressed = true;
            state.last_transition = Transition::Pressed;
        }
    }

    pub fn key_up(&mut self, key: Key) {
        let state = &mut self.keys[key.index()];
        if state.is_pressed {
            state.is_pressed = false;
            state.last_transition = Transition::Released;
        }
    }

    pub fn key(&self, key: Key) -> KeyState {
        self.keys[key.index()]
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.keys[key.index()].is_pressed
    }

    pub fn is_just_pressed(&self, key: Key) -> bool {
        self.keys[key.index()].last_transition == Transition::Pressed
    }

    pub fn is_just_released(&self, key: Key) -> bool {
        self.keys[key.index()].last_transition == Transition::Released
    }

    pub fn end_frame(&mut self) {
        for state in &mut self.keys {
            state.last_transition = Transition::None;
        }
    }

    /// Releases every key, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        for state in &mut self.keys {
            if state.is_pressed {
                state.is_pressed = false;
                state.last_transition = Transition::Released;
            }
        }
    }
}
