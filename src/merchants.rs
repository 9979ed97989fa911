// ===============================
// src/merchants.rs
// ===============================
//
// Static merchant directory (external configuration, read-only).
//
use ahash::AHashMap as HashMap;

use crate::domain::{Merchant, NetworkOption, OrderLimits};

pub const DEFAULT_MERCHANT_ID: &str = "m0";

#[derive(Debug, Clone)]
pub struct MerchantDirectory {
    by_id: HashMap<String, Merchant>,
}

impl MerchantDirectory {
    pub fn builtin() -> Self {
        let networks = vec![
            NetworkOption {
                name: "OPTIMISM (Optimism Network)".into(),
                notes: "Fastest and low-cost. Recommended for most deposits.".into(),
            },
            NetworkOption {
                name: "ETH (Ethereum ERC-20)".into(),
                notes: "Very secure but higher gas fees.".into(),
            },
            NetworkOption {
                name: "WLD (World Chain)".into(),
                notes: "Lowest minimum deposit, cheapest fees, but slower.".into(),
            },
        ];
        let wekewa = Merchant {
            id: DEFAULT_MERCHANT_ID.into(),
            name: "Wekewa Official".into(),
            deposit_address: Some("0x5e7ef40b29147e856a3615bbef78140f5d19844e".into()),
            networks,
            limits: OrderLimits::default(),
        };
        let mut by_id = HashMap::new();
        by_id.insert(wekewa.id.clone(), wekewa);
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Merchant> { self.by_id.get(id) }

    pub fn default_merchant(&self) -> &Merchant {
        // builtin() selalu berisi DEFAULT_MERCHANT_ID
        &self.by_id[DEFAULT_MERCHANT_ID]
    }

    /// Network by index; returns None for an out-of-range selection.
    pub fn network<'a>(&'a self, merchant: &'a Merchant, index: usize) -> Option<&'a NetworkOption> {
        merchant.networks.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_default_merchant_with_three_networks() {
        let dir = MerchantDirectory::builtin();
        let m = dir.default_merchant();
        assert_eq!(m.name, "Wekewa Official");
        assert_eq!(m.networks.len(), 3);
        assert!(dir.get("m0").is_some());
        assert!(dir.get("nope").is_none());
        assert!(dir.network(m, 3).is_none());
    }
}
