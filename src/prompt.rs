use anyhow::Result;
use dialoguer::{Input, Password};

/// Ask for the iCloud email address. An empty answer is returned as-is;
/// the caller decides what to do with it.
pub fn ask_username() -> Result<String> {
    let username: String = Input::new()
        .with_prompt("Enter your iCloud email address")
        .allow_empty(true)
        .interact_text()?;
    Ok(username.trim().to_string())
}

/// Concealed password prompt; nothing is echoed to the terminal.
pub fn ask_password(username: &str) -> Result<String> {
    let password = Password::new()
        .with_prompt(format!("Enter iCloud password for {username}"))
        .interact()?;
    Ok(password)
}
