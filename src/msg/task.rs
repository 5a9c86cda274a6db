//! Task items.
//!
//! Task attributes are named properties in the task property set (plus one in
//! the common set). [`Task`] maps each attribute to its key and type; absent
//! attributes come back as `None`.

use super::decode::{Coded, PropertyCode, Timestamp};
use super::entity::{Entity, OptionalProperty};
use super::guid::{PSETID_COMMON, PSETID_TASK, PropertySetId};
use super::tag::PropertyKey;
use crate::common::error::PropertyError;
use crate::ole::ByteStore;

macro_rules! property_code {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident = $code:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$variant_meta])* $variant,)+
        }

        impl PropertyCode for $name {
            const CODE_SET: &'static str = stringify!($name);

            fn from_code(raw: i64) -> Option<Self> {
                match raw {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

property_code! {
    /// Completion status of a task
    pub enum TaskStatus {
        NotStarted = 0,
        InProgress = 1,
        Complete = 2,
        WaitingOnOther = 3,
        Deferred = 4,
    }
}

property_code! {
    /// Whether the assignee has accepted a task request
    pub enum TaskAcceptance {
        NotAssigned = 0,
        Unknown = 1,
        Accepted = 2,
        Rejected = 3,
    }
}

property_code! {
    /// The last change made to a task
    pub enum TaskHistory {
        None = 0,
        Accepted = 1,
        Rejected = 2,
        AnotherPropertyChanged = 3,
        DueDateChanged = 4,
        Assigned = 5,
    }
}

property_code! {
    /// Role of a task item in a task communication
    pub enum TaskMode {
        Unassigned = 0,
        EmbeddedRequest = 1,
        AcceptedByAssignee = 2,
        RejectedByAssignee = 3,
        EmbeddedUpdate = 4,
        AssigneeCopy = 5,
    }
}

property_code! {
    /// Whose copy of an assigned task this is
    pub enum TaskOwnership {
        NotAssigned = 0,
        AssignersCopy = 1,
        AssigneesCopy = 2,
    }
}

pub const PERCENT_COMPLETE: u32 = 0x8102;
pub const TASK_ACCEPTANCE_STATE: u32 = 0x812A;
pub const TASK_ACTUAL_EFFORT: u32 = 0x8110;
pub const TASK_ASSIGNER: u32 = 0x8121;
pub const TASK_COMPLETE: u32 = 0x811C;
pub const TASK_CUSTOM_FLAGS: u32 = 0x8139;
pub const TASK_DUE_DATE: u32 = 0x8105;
pub const TASK_ESTIMATED_EFFORT: u32 = 0x8111;
pub const TASK_RECURRING: u32 = 0x8126;
pub const TASK_HISTORY: u32 = 0x811A;
pub const TASK_LAST_DELEGATE: u32 = 0x8125;
pub const TASK_LAST_USER: u32 = 0x8122;
/// In [`PSETID_COMMON`]
pub const TASK_MODE: u32 = 0x8518;
pub const TASK_OWNER: u32 = 0x811F;
pub const TASK_OWNERSHIP: u32 = 0x8129;
pub const TASK_START_DATE: u32 = 0x8104;
pub const TASK_STATUS: u32 = 0x8101;
pub const TASK_STATUS_ON_COMPLETE: u32 = 0x8119;
pub const TASK_UPDATES: u32 = 0x811B;
pub const TASK_VERSION: u32 = 0x8113;

type Attribute<T> = Result<Option<T>, PropertyError>;

/// A message read as a task item.
#[derive(Debug)]
pub struct Task<S: ByteStore> {
    entity: Entity<S>,
}

impl<S: ByteStore> Task<S> {
    pub fn new(entity: Entity<S>) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &Entity<S> {
        &self.entity
    }

    pub fn into_entity(self) -> Entity<S> {
        self.entity
    }

    fn key(set: PropertySetId, id: u32) -> PropertyKey {
        PropertyKey::named(set, id)
    }

    fn task(id: u32) -> PropertyKey {
        Self::key(PSETID_TASK, id)
    }

    /// Fraction of the work done; 1.0 means complete.
    pub fn percent_complete(&self) -> Attribute<f64> {
        self.entity.percentage(Self::task(PERCENT_COMPLETE)).optional()
    }

    pub fn acceptance_state(&self) -> Attribute<Coded<TaskAcceptance>> {
        self.entity.coded(Self::task(TASK_ACCEPTANCE_STATE)).optional()
    }

    /// Minutes actually spent on the task.
    pub fn actual_effort(&self) -> Attribute<i64> {
        self.entity.integer(Self::task(TASK_ACTUAL_EFFORT)).optional()
    }

    /// Name of the user that last assigned the task.
    pub fn assigner(&self) -> Attribute<String> {
        self.entity.text(Self::task(TASK_ASSIGNER)).optional()
    }

    pub fn complete(&self) -> Attribute<bool> {
        self.entity.boolean(Self::task(TASK_COMPLETE)).optional()
    }

    pub fn custom_flags(&self) -> Attribute<i64> {
        self.entity.integer(Self::task(TASK_CUSTOM_FLAGS)).optional()
    }

    pub fn due_date(&self) -> Attribute<Timestamp> {
        self.entity.timestamp(Self::task(TASK_DUE_DATE)).optional()
    }

    /// Minutes the user expects to work on the task.
    pub fn estimated_effort(&self) -> Attribute<i64> {
        self.entity.integer(Self::task(TASK_ESTIMATED_EFFORT)).optional()
    }

    /// Whether the task has a recurrence pattern.
    pub fn recurring(&self) -> Attribute<bool> {
        self.entity.boolean(Self::task(TASK_RECURRING)).optional()
    }

    pub fn history(&self) -> Attribute<Coded<TaskHistory>> {
        self.entity.coded(Self::task(TASK_HISTORY)).optional()
    }

    pub fn last_delegate(&self) -> Attribute<String> {
        self.entity.text(Self::task(TASK_LAST_DELEGATE)).optional()
    }

    pub fn last_user(&self) -> Attribute<String> {
        self.entity.text(Self::task(TASK_LAST_USER)).optional()
    }

    /// Should be [`TaskMode::Unassigned`] on task items themselves.
    pub fn mode(&self) -> Attribute<Coded<TaskMode>> {
        self.entity.coded(Self::key(PSETID_COMMON, TASK_MODE)).optional()
    }

    pub fn owner(&self) -> Attribute<String> {
        self.entity.text(Self::task(TASK_OWNER)).optional()
    }

    pub fn ownership(&self) -> Attribute<Coded<TaskOwnership>> {
        self.entity.coded(Self::task(TASK_OWNERSHIP)).optional()
    }

    pub fn start_date(&self) -> Attribute<Timestamp> {
        self.entity.timestamp(Self::task(TASK_START_DATE)).optional()
    }

    pub fn status(&self) -> Attribute<Coded<TaskStatus>> {
        self.entity.coded(Self::task(TASK_STATUS)).optional()
    }

    /// Whether the assignee was asked to report completion.
    pub fn status_on_complete(&self) -> Attribute<bool> {
        self.entity.boolean(Self::task(TASK_STATUS_ON_COMPLETE)).optional()
    }

    /// Whether the assignee was asked to send updates.
    pub fn updates(&self) -> Attribute<bool> {
        self.entity.boolean(Self::task(TASK_UPDATES)).optional()
    }

    pub fn version(&self) -> Attribute<i64> {
        self.entity.integer(Self::task(TASK_VERSION)).optional()
    }
}

impl<S: ByteStore> From<Entity<S>> for Task<S> {
    fn from(entity: Entity<S>) -> Self {
        Self::new(entity)
    }
}
