use std::path::PathBuf;

use crate::common::{ClientCommand, RequestId};

/// What a typed line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(ClientCommand),
    Quit,
    Empty,
}

/// `/attach PATH` uploads a file, `/help ID` volunteers for a request,
/// `/complete ID` confirms one of yours, `/close` leaves the chat and `/quit`
/// exits. Anything else is sent as a message.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    match line.split_once(char::is_whitespace) {
        Some(("/attach", path)) if !path.trim().is_empty() => {
            Input::Command(ClientCommand::SendAttachment {
                path: PathBuf::from(path.trim()),
            })
        }
        Some(("/help", id)) if !id.trim().is_empty() => {
            Input::Command(ClientCommand::OfferHelp(RequestId::new(id.trim())))
        }
        Some(("/complete", id)) if !id.trim().is_empty() => {
            Input::Command(ClientCommand::CompleteRequest(RequestId::new(id.trim())))
        }
        _ => match line {
            "/close" => Input::Command(ClientCommand::CloseChat),
            "/quit" | "/exit" => Input::Quit,
            "/refresh" => Input::Command(ClientCommand::RefreshFeed),
            text => Input::Command(ClientCommand::SendMessage {
                text: text.to_string(),
            }),
        },
    }
}
