use anyhow::Result;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "macos")]
pub fn run() -> Result<()> {
    macos::run()
}

#[cfg(windows)]
pub fn run() -> Result<()> {
    windows::run()
}

#[cfg(not(any(target_os = "macos", windows)))]
pub fn run() -> Result<()> {
    anyhow::bail!("The tray menu supports macOS and Windows; use the budgetnav CLI elsewhere.")
}
