//! Push notifications for dispatch offers via the Expo push service.

mod expo;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod notifier;

pub use dispatch_types::{PushError, PushGateway, PushMessage};
pub use expo::{ExpoPushGateway, DEFAULT_EXPO_PUSH_URL};
pub use notifier::{format_amount, Notifier, ALERT_TITLE};

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockPushGateway;
