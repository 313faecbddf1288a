/// Asks the person at the keyboard to confirm a destructive operation.
///
/// Closures work directly:
///
/// ```
/// use shared_catalog::catalog::Confirm;
///
/// let always = |_prompt: &str| true;
/// assert!(always.confirm("Delete?"));
/// ```
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Answers yes to every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Confirmed;

impl Confirm for Confirmed {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Answers no to every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Declined;

impl Confirm for Declined {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}
