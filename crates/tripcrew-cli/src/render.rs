use anyhow::Result;
use bat::WrappingMode;
use console::style;

use tripcrew::models::message::Message;
use tripcrew::models::role::Role;

const THEME: &str = "ansi";

pub fn print_markdown(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()?;
    println!();
    Ok(())
}

fn print_tool_request(content: &str, tool_name: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Request: {}", tool_name)),
        )
        .theme(THEME)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()?;
    Ok(())
}

fn print_tool_response(content: &str, tool_name: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Response: {}", tool_name)))
        .theme(THEME)
        .language("Markdown")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()?;
    Ok(())
}

/// Render one transcript entry while the conversation is still running
pub fn print_message(message: &Message) -> Result<()> {
    if message.role == Role::Tool {
        if let Some(result) = &message.tool_result {
            return print_tool_response(&result.as_text(), &result.tool_name);
        }
        return Ok(());
    }

    let speaker = style(&message.speaker).bold().cyan();
    if message.is_failed() {
        println!("{} {}", speaker, style(&message.content).red());
        return Ok(());
    }

    println!("{}", speaker);
    if !message.content.trim().is_empty() {
        print_markdown(&message.content)?;
    }
    if let Some(call) = &message.tool_call {
        let arguments = serde_json::to_string_pretty(&call.arguments)?;
        print_tool_request(&arguments, &call.name)?;
    }
    Ok(())
}
