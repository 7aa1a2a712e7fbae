//! Who may act on which order

use crate::core::auth::{AuthContext, AuthPolicy, Role};
use crate::core::error::{MartError, Result};
use crate::orders::model::Order;

/// Relationship an actor needs with an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAccess {
    /// The buyer who placed it
    Buyer,
    /// A seller owning at least one line item
    Seller,
    /// Either of the above
    Participant,
}

impl OrderAccess {
    fn policy(&self) -> AuthPolicy {
        let roles = match self {
            OrderAccess::Buyer => vec![Role::Buyer, Role::Admin],
            OrderAccess::Seller => vec![Role::Seller, Role::Admin],
            OrderAccess::Participant => vec![Role::Buyer, Role::Seller, Role::Admin],
        };
        AuthPolicy::HasRole(roles)
    }

    /// Admins pass every check; everyone else must be related to the order
    pub fn ensure(&self, actor: &AuthContext, order: &Order, action: &str) -> Result<()> {
        self.policy().enforce(actor, action)?;
        if actor.is_admin() {
            return Ok(());
        }

        let is_buyer = actor.acts_as(Role::Buyer, &order.buyer_id);
        let is_seller = matches!(
            actor,
            AuthContext::User { user_id, role: Role::Seller } if order.has_seller(user_id)
        );
        let allowed = match self {
            OrderAccess::Buyer => is_buyer,
            OrderAccess::Seller => is_seller,
            OrderAccess::Participant => is_buyer || is_seller,
        };

        if allowed {
            Ok(())
        } else {
            Err(MartError::forbidden(format!(
                "order '{}' does not belong to this {}",
                order.human_order_id,
                actor.role().map(|r| r.as_str()).unwrap_or("actor")
            )))
        }
    }
}
