pub mod campaign;
pub mod queue_item;
pub mod recipient;
pub mod work_item;

pub use campaign::{
    Campaign, CampaignStatus, EmailFormat, Section, SectionMode, SectionType, Sender,
    SubjectLine, SubjectMode,
};
pub use queue_item::{NewQueueItem, PlanAssignment, PlanInput, QueueItem, QueueItemStatus, RecipientMetadata};
pub use recipient::{RecipientAttachment, RecipientStatus};
pub use work_item::{WorkItem, WorkItemKind, WorkItemStatus};
