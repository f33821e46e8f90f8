use vvp_ir::Bit;

/// Number of addressable bits in a thread
pub const ADDRESS_SPACE: u32 = 0x10000;
/// Lowest address owned by the allocator. Everything below is reserved for the
/// constant bits and the compare flags
pub const ALLOCATION_FLOOR: u32 = 8;

/// The address of a bit in the thread bit space
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Address(pub u32);

impl Address {
    pub fn constant(bit: Bit) -> Self {
        match bit {
            Bit::Zero => Address(0),
            Bit::One => Address(1),
            Bit::X => Address(2),
            Bit::Z => Address(3),
        }
    }

    pub fn offset(self, by: u32) -> Self {
        Address(self.0 + by)
    }

    pub fn is_constant(self) -> bool {
        self.0 < 4
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result bits written by the compare instructions. The region is shared by
/// every compare in a thread so a value may never stay here for long
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flag {
    /// Bit 4: `==` equality (x if either side has x or z bits)
    Eq,
    /// Bit 5: less than
    Lt,
    /// Bit 6: `===` exact four-valued equality
    CaseEq,
    /// Bit 7
    Spare,
}

impl Flag {
    pub fn address(self) -> Address {
        match self {
            Flag::Eq => Address(4),
            Flag::Lt => Address(5),
            Flag::CaseEq => Address(6),
            Flag::Spare => Address(7),
        }
    }
}

/// Where a computed value lives
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Vector {
    /// `width` copies of a constant bit. Reading a constant never advances the
    /// source address, so a single reserved address covers any width
    Constant { bit: Bit, width: u32 },
    /// A single bit of the compare flag region
    Flag(Flag),
    /// Bits allocated from the thread bit space
    Owned { base: Address, width: u32 },
}

impl Vector {
    pub fn zero(width: u32) -> Self {
        Vector::Constant {
            bit: Bit::Zero,
            width,
        }
    }

    pub fn base(&self) -> Address {
        match self {
            Vector::Constant { bit, .. } => Address::constant(*bit),
            Vector::Flag(flag) => flag.address(),
            Vector::Owned { base, .. } => *base,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Vector::Constant { width, .. } => *width,
            Vector::Flag(_) => 1,
            Vector::Owned { width, .. } => *width,
        }
    }

    /// The address holding bit `idx` of the value
    pub fn bit(&self, idx: u32) -> Address {
        assert!(
            idx < self.width(),
            "bit {idx} is out of range for a {} bit vector",
            self.width()
        );
        match self {
            Vector::Constant { bit, .. } => Address::constant(*bit),
            Vector::Flag(flag) => flag.address(),
            Vector::Owned { base, .. } => base.offset(idx),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Vector::Owned { .. })
    }

    pub fn as_constant(&self) -> Option<Bit> {
        match self {
            Vector::Constant { bit, .. } => Some(*bit),
            _ => None,
        }
    }
}

impl std::fmt::Display for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.base(), self.width())
    }
}
