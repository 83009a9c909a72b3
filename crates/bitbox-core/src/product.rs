//! Product variants and the firmware support table.

use std::fmt;

use crate::version::SemVer;

/// Device product variant, fixed for the lifetime of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    /// Multi-coin edition.
    BitBox02Multi,
    /// Bitcoin-only edition.
    BitBox02BtcOnly,
    /// Base station.
    BitBoxBaseStandard,
}

impl Product {
    pub const ALL: [Product; 3] = [
        Product::BitBox02Multi,
        Product::BitBox02BtcOnly,
        Product::BitBoxBaseStandard,
    ];

    /// Resolve a product from its USB product string.
    pub fn from_usb_product_string(s: &str) -> Option<Self> {
        match s {
            "BitBox02" => Some(Self::BitBox02Multi),
            "BitBox02BTC" => Some(Self::BitBox02BtcOnly),
            "BitBoxBase" | "BitBoxBaseStandard" => Some(Self::BitBoxBaseStandard),
            _ => None,
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::BitBox02Multi => write!(f, "BitBox02 Multi"),
            Product::BitBox02BtcOnly => write!(f, "BitBox02 Bitcoin-only"),
            Product::BitBoxBaseStandard => write!(f, "BitBoxBase Standard"),
        }
    }
}

/// Firmware versions this host can talk to.
///
/// Built once as a `static` and handed to each [`Device`](crate::Device) by
/// reference; never mutated.
#[derive(Debug)]
pub struct SupportTable {
    /// Oldest firmware this host speaks the bootstrap protocol with.
    pub lowest_supported: SemVer,
    /// First firmware that is too new for this host.
    pub lowest_non_supported: SemVer,
    /// Per-product minimum; older firmware must be upgraded before use.
    pub product_minimums: &'static [(Product, SemVer)],
}

impl SupportTable {
    /// True if the host can run the protocol with `version` at all.
    pub fn host_supports(&self, version: SemVer) -> bool {
        version.at_least(self.lowest_supported) && version < self.lowest_non_supported
    }

    /// Minimum firmware for `product`.
    ///
    /// # Panics
    ///
    /// Panics if `product` has no entry; every product the crate knows about
    /// must be registered in the table it is used with.
    pub fn minimum_for(&self, product: Product) -> SemVer {
        self.product_minimums
            .iter()
            .find(|(p, _)| *p == product)
            .map(|(_, v)| *v)
            .unwrap_or_else(|| panic!("no minimum firmware version registered for {product}"))
    }

    /// True if `version` is too old for `product` and needs a firmware upgrade.
    pub fn requires_firmware_upgrade(&self, version: SemVer, product: Product) -> bool {
        version < self.minimum_for(product)
    }
}

/// Support table shipped with this driver.
pub static SUPPORT_TABLE: SupportTable = SupportTable {
    lowest_supported: SemVer::new(1, 0, 0),
    lowest_non_supported: SemVer::new(5, 0, 0),
    product_minimums: &[
        (Product::BitBox02Multi, SemVer::new(2, 0, 0)),
        (Product::BitBox02BtcOnly, SemVer::new(4, 1, 1)),
        (Product::BitBoxBaseStandard, SemVer::new(4, 3, 0)),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_product_registered() {
        for product in Product::ALL {
            let _ = SUPPORT_TABLE.minimum_for(product);
        }
    }

    #[test]
    fn test_host_range() {
        assert!(!SUPPORT_TABLE.host_supports(SemVer::new(0, 9, 0)));
        assert!(SUPPORT_TABLE.host_supports(SemVer::new(1, 0, 0)));
        assert!(SUPPORT_TABLE.host_supports(SemVer::new(4, 99, 99)));
        assert!(!SUPPORT_TABLE.host_supports(SemVer::new(5, 0, 0)));
    }

    #[test]
    fn test_firmware_upgrade_gate() {
        let gate = |major, minor, patch, product| {
            SUPPORT_TABLE.requires_firmware_upgrade(SemVer::new(major, minor, patch), product)
        };
        assert!(gate(1, 0, 0, Product::BitBox02Multi));
        assert!(!gate(2, 0, 0, Product::BitBox02Multi));
        assert!(gate(4, 1, 0, Product::BitBox02BtcOnly));
        assert!(!gate(4, 1, 1, Product::BitBox02BtcOnly));
        assert!(gate(4, 2, 1, Product::BitBoxBaseStandard));
        assert!(!gate(4, 3, 0, Product::BitBoxBaseStandard));
    }

    #[test]
    #[should_panic(expected = "no minimum firmware version registered")]
    fn test_missing_product_panics() {
        static PARTIAL: SupportTable = SupportTable {
            lowest_supported: SemVer::new(1, 0, 0),
            lowest_non_supported: SemVer::new(5, 0, 0),
            product_minimums: &[(Product::BitBox02Multi, SemVer::new(2, 0, 0))],
        };
        PARTIAL.minimum_for(Product::BitBoxBaseStandard);
    }

    #[test]
    fn test_usb_product_strings() {
        assert_eq!(
            Product::from_usb_product_string("BitBox02BTC"),
            Some(Product::BitBox02BtcOnly)
        );
        assert_eq!(Product::from_usb_product_string("Nano S"), None);
    }
}
