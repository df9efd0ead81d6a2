//! Synthetic moving test pattern

/// Packed RGB frames with a diagonal gradient that shifts every frame
#[derive(Debug, Clone)]
pub struct Pattern {
    width: u32,
    height: u32,
    index: u64,
    buffer: Vec<u8>,
}

impl Pattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            index: 0,
            buffer: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames rendered so far
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Render the next frame into the internal buffer
    pub fn next_frame(&mut self) -> &[u8] {
        let shift = self.index as usize;
        let width = self.width as usize;
        for (i, pixel) in self.buffer.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % width, i / width);
            pixel[0] = (x + shift) as u8;
            pixel[1] = (y + shift) as u8;
            // Blue carries the frame counter so consumers can spot repeats.
            pixel[2] = shift as u8;
        }
        self.index += 1;
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_and_motion() {
        let mut pattern = Pattern::new(4, 2);
        assert_eq!(pattern.frame_len(), 24);

        let first = pattern.next_frame().to_vec();
        let second = pattern.next_frame().to_vec();
        assert_eq!(first.len(), 24);
        assert_ne!(first, second);
        assert_eq!(first[2], 0);
        assert_eq!(second[2], 1);
        // Pixel (1, 1) of the second frame.
        assert_eq!(&second[15..18], &[2, 2, 1]);
        assert_eq!(pattern.index(), 2);
    }
}
