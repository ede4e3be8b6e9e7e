//! Accessibility action sets exposed by UI tree nodes.

use bitflags::bitflags;

bitflags! {
    /// Actions a UI node declares it supports.
    ///
    /// Hosts map their native action ids onto these bits; unknown ids are
    /// dropped since the classifier and the scroll loop only look at the
    /// ones listed here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeActions: u32 {
        /// Node reacts to a tap (links, buttons).
        const CLICK           = 1 << 0;
        /// Node reacts to a long press.
        const LONG_CLICK      = 1 << 1;
        /// Node can take input focus.
        const FOCUS           = 1 << 2;
        /// Node scrolls its content forward (down).
        const SCROLL_FORWARD  = 1 << 3;
        /// Node scrolls its content backward (up).
        const SCROLL_BACKWARD = 1 << 4;
    }
}

impl NodeActions {
    /// Parse a lowercase action name such as `"click"` or `"scroll_forward"`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_name(&name.to_ascii_uppercase())
    }

    /// Whether the node declares the click action.
    pub fn is_clickable(&self) -> bool {
        self.contains(Self::CLICK)
    }

    /// Whether the node can be scrolled forward.
    pub fn can_scroll_forward(&self) -> bool {
        self.contains(Self::SCROLL_FORWARD)
    }

    /// Whether the node scrolls in either direction.
    pub fn is_scrollable(&self) -> bool {
        self.intersects(Self::SCROLL_FORWARD | Self::SCROLL_BACKWARD)
    }
}
