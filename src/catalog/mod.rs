//! Read-only view of products and users consumed by the order core
//!
//! Product CRUD and user registration live elsewhere. The order service only
//! needs enough to check line-item sellers, price a cart and decorate order
//! views for display.

use crate::core::entity::Entity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product fields an order cares about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub seller_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Entity for ProductSummary {
    fn resource_name() -> &'static str {
        "products"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upi_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}

/// A user as the directory exposes it
///
/// There is no credential field on this type; the directory never hands one out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    #[serde(default)]
    pub payment_details: PaymentDetails,
}

impl Entity for UserProfile {
    fn resource_name() -> &'static str {
        "users"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

/// The part of a profile shown next to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for UserSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            email: profile.email.clone(),
        }
    }
}
