/// Line shown under a conversation while others type.
///
/// Names are rendered in the order given; duplicates are the caller's problem.
pub fn typing_text<S: AsRef<str>>(names: &[S]) -> Option<String> {
    match names {
        [] => None,
        [only] => Some(format!("{} is typing...", only.as_ref())),
        [rest @ .., last] => {
            let head = rest.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join(", ");
            Some(format!("{} and {} are typing...", head, last.as_ref()))
        }
    }
}
