use crate::error::MatrixError;

/// Split `items` into consecutive batches of at most `max_size` elements.
///
/// Order is preserved and only the last batch may be shorter.
pub fn split<T: Clone>(items: &[T], max_size: usize) -> Result<Vec<Vec<T>>, MatrixError> {
    if max_size == 0 {
        return Err(MatrixError::InvalidArgument(
            "batch size must be positive".to_string(),
        ));
    }
    Ok(items.chunks(max_size).map(|chunk| chunk.to_vec()).collect())
}
