use rayon::prelude::*;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Dense row-major 2D buffer backed by a single allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width as usize * height as usize],
        }
    }
}

impl<T> Grid<T> {
    pub fn from_cells(width: u32, height: u32, cells: Vec<T>) -> Option<Self> {
        if cells.len() == width as usize * height as usize {
            Some(Self {
                width,
                height,
                cells,
            })
        } else {
            None
        }
    }

    pub fn par_from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        T: Send,
        F: Fn(Pixel) -> T + Sync,
    {
        let cells = (0..width as usize * height as usize)
            .into_par_iter()
            .map(|i| {
                let (x, y) = (i % width as usize, i / width as usize);
                f(Pixel::new(x as u32, y as u32))
            })
            .collect();
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    pub fn checked_pixel(&self, x: i64, y: i64) -> Option<Pixel> {
        if self.contains(x, y) {
            Some(Pixel::new(x as u32, y as u32))
        } else {
            None
        }
    }

    fn offset(&self, p: Pixel) -> usize {
        debug_assert!(p.x < self.width && p.y < self.height);
        p.y as usize * self.width as usize + p.x as usize
    }

    pub fn get(&self, p: Pixel) -> &T {
        &self.cells[self.offset(p)]
    }

    pub fn get_mut(&mut self, p: Pixel) -> &mut T {
        let offset = self.offset(p);
        &mut self.cells[offset]
    }

    pub fn set(&mut self, p: Pixel, value: T) {
        *self.get_mut(p) = value;
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn pixels(&self) -> impl Iterator<Item = (Pixel, &T)> + '_ {
        let width = self.width as usize;
        self.cells.iter().enumerate().map(move |(i, v)| {
            (Pixel::new((i % width) as u32, (i / width) as u32), v)
        })
    }
}
