mod agg;
mod base;
mod eventmsg;
mod multi;
mod single;

pub use self::{
    agg::AggNumberedCommandSender,
    base::SentCallback,
    multi::{MultiNumberedCommandSender, NumberedCommandResult, ResultCallback, SharedResults},
    single::{NumberedCommandSender, ResultsFuture},
};
