pub mod domain;
pub mod entitlement;
pub mod identity;
pub mod locator;
pub mod ports;

pub use domain::{Chapter, Course, CourseModule, Enrollment, Lesson, LessonAddress, LessonKind};
pub use entitlement::{Access, EntitlementResolver, Grant};
pub use identity::RequestContext;
pub use locator::{locate_lesson, locate_with_precedence, remove_lesson, HierarchyPrecedence};
pub use ports::{CatalogStore, IdentityDirectory, PortError, PortResult};
