//! Per-buyer cart as seen by checkout

use crate::core::entity::Entity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Also the cart's storage key
    pub buyer_id: Uuid,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn empty(buyer_id: Uuid) -> Self {
        Self {
            buyer_id,
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| item.quantity == 0)
    }
}

impl Entity for Cart {
    fn resource_name() -> &'static str {
        "carts"
    }

    fn id(&self) -> Uuid {
        self.buyer_id
    }
}
