pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{ConversationState, SessionId};
pub use domain::message::{Message, MessageRole};
pub use domain::persona::{Persona, PersonaCatalog};
pub use domain::tariff::{TariffCatalog, TariffPlan};
pub use errors::{ApplicationError, DomainError, InterfaceError};
