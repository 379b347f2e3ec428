use crate::common::{ChatMessage, ChatSummary, HelpRequest, UserHandle, UserId, UserRef};

/// The other party of a request, seen from one viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum Counterpart {
    Helper(UserHandle),
    Creator(UserHandle),
    Unknown,
}

impl Counterpart {
    pub fn user(&self) -> Option<&UserHandle> {
        match self {
            Counterpart::Helper(user) | Counterpart::Creator(user) => Some(user),
            Counterpart::Unknown => None,
        }
    }

    pub fn profile(&self) -> Option<UserRef> {
        self.user().map(|user| match user {
            UserHandle::Profile(profile) => profile.clone(),
            UserHandle::Id(id) => UserRef::new(id.as_str()),
        })
    }
}

/// Precedence:
/// 1. the viewer created the request and someone volunteered: the helper;
/// 2. the viewer is anyone else: the creator;
/// 3. otherwise the creator if known, else `Unknown`.
pub fn resolve_counterpart(viewer: &UserId, request: &HelpRequest) -> Counterpart {
    let creator = request.created_by.as_ref();
    let viewer_is_creator = creator.is_some_and(|creator| creator.is(viewer));

    match (viewer_is_creator, &request.completed_by, creator) {
        (true, Some(helper), _) => Counterpart::Helper(helper.clone()),
        (_, _, Some(creator)) => Counterpart::Creator(creator.clone()),
        _ => Counterpart::Unknown,
    }
}

/// Someone other than the viewer to start a chat with about `request`.
///
/// A creator without a helper resolves to themself, which is nobody to
/// contact.
pub fn contact_for(viewer: &UserId, request: &HelpRequest) -> Option<UserRef> {
    resolve_counterpart(viewer, request)
        .profile()
        .filter(|other| other.id != *viewer)
}

/// First participant that is not the viewer.
pub fn summary_counterpart<'a>(viewer: &UserId, summary: &'a ChatSummary) -> Option<&'a UserRef> {
    summary
        .participants
        .iter()
        .find(|participant| participant.id != *viewer)
}

/// Name to show for the other side of a chat: the known counterpart, then the
/// first foreign sender with a profile, then "User".
pub fn chat_partner_name(
    viewer: &UserId,
    counterpart: Option<&UserRef>,
    messages: &[ChatMessage],
) -> String {
    counterpart
        .and_then(UserRef::display_name)
        .or_else(|| {
            messages
                .iter()
                .filter(|message| !message.is_from(viewer))
                .find_map(|message| message.sender.as_ref()?.display_name())
        })
        .unwrap_or("User")
        .to_string()
}
