// commands/mod.rs - Command Module Registry
// Declares the bot's slash command modules so main.rs can register and dispatch them

pub mod addgif;         // /addgif - add a GIF to the public asset host
