//! # Messages
//!
//! Constant strings and format functions for user-facing messages.
//! Includes menu texts, status updates, and error replies.

pub const CHOOSE_ACTION: &str =
    "You may choose what task I should help you with. To stop conversation use /stop command.";
pub const CHOOSE_TASK: &str = "Select what task should be done with prompt.";
pub const TYPE_DESCRIPTION: &str = "Type your description.";

pub const PROCEED_REQUEST: &str = "Proceed request... 👨‍💻";
pub const UNKNOWN_REQUEST: &str = "Sorry unknown request. 😔";

pub const STOPPED: &str = "Okay, bye.";
pub const CONVERSATION_ENDED: &str = "See you around! 😉";

pub const LOGIN_REQUIRED: &str = "To use this service you should be logged in";
pub const LOGIN_USAGE: &str = "Usage: /login <user>:<password>";
pub const LOGIN_OK: &str = "Success.";
pub const LOGIN_FAILED: &str = "Incorrect login or password";

pub const GENERIC_ERROR: &str = "Sorry, something went wrong";
pub const SERVICE_UNAVAILABLE: &str = "Sorry, service unavailable";

pub const AUDIO_TITLE: &str = "Your audio file...";

pub const HELP_TEXT: &str = "\
Useful commands:
/start - Show the task menu
/chat - Free-form conversation. LLM Model: Claude-3.5-sonnet
/summarize - I will summarize your text
/translate - I will translate your text to english
/image - I will create image according to your description. SD Model: Flux
/audio - I will read your text out loud
/login - Log in to use the image and audio services
/stop - End the conversation";
