use bitflags::bitflags;

bitflags! {
    /// Classification of a math region along two independent axes: inline vs
    /// display, and dollar vs AMS bracket notation. A legal flavor has exactly
    /// one bit set on each axis.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct Flavor: u8 {
        const INLINE = 1 << 0;
        const DISPLAY = 1 << 1;
        const AMS = 1 << 2;
        const DOLLAR = 1 << 3;
    }
}

impl Flavor {
    pub const INLINE_DOLLAR: Flavor = Flavor::INLINE.union(Flavor::DOLLAR);
    pub const DISPLAY_DOLLAR: Flavor = Flavor::DISPLAY.union(Flavor::DOLLAR);
    pub const INLINE_AMS: Flavor = Flavor::INLINE.union(Flavor::AMS);
    pub const DISPLAY_AMS: Flavor = Flavor::DISPLAY.union(Flavor::AMS);

    pub fn is_inline(self) -> bool {
        self.contains(Flavor::INLINE)
    }

    pub fn is_display(self) -> bool {
        self.contains(Flavor::DISPLAY)
    }

    /// True when exactly one bit of each axis is set.
    pub fn is_valid(self) -> bool {
        let style = self & (Flavor::INLINE | Flavor::DISPLAY);
        let notation = self & (Flavor::AMS | Flavor::DOLLAR);
        style.bits().count_ones() == 1 && notation.bits().count_ones() == 1
    }
}

/// One catalog entry: the opening and closing byte patterns of a math region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Delimiter {
    pub begin: &'static str,
    pub end: &'static str,
    pub flavor: Flavor,
}

/// Openers in match priority. `$$` precedes `$` so a display region is never
/// read as two adjacent inline regions.
pub static CATALOG: [Delimiter; 4] = [
    Delimiter {
        begin: "$$",
        end: "$$",
        flavor: Flavor::DISPLAY_DOLLAR,
    },
    Delimiter {
        begin: "$",
        end: "$",
        flavor: Flavor::INLINE_DOLLAR,
    },
    Delimiter {
        begin: "\\(",
        end: "\\)",
        flavor: Flavor::INLINE_AMS,
    },
    Delimiter {
        begin: "\\[",
        end: "\\]",
        flavor: Flavor::DISPLAY_AMS,
    },
];

/// Returns the catalog entry whose opener is a prefix of `line`.
pub fn classify(line: &str) -> Option<&'static Delimiter> {
    CATALOG.iter().find(|entry| line.starts_with(entry.begin))
}

/// Closing delimiter for a legal flavor.
pub fn closer_for(flavor: Flavor) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|entry| entry.flavor == flavor)
        .map(|entry| entry.end)
}

/// Bytes that may start a math region.
pub const TRIGGERS: &[u8] = b"$\\";
