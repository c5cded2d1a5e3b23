mod activities;
mod applications;
mod attachments;
mod details;
mod participants;

pub use attachments::NewAttachment;
