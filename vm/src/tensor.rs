use crate::{Blob, VirtualMachine};
use digit_layout::DigitLayout;
use ndarray_layout::{ArrayLayout, Endian::BigEndian};
use std::sync::Arc;

/// 虚拟系统中的张量。
///
/// 张量只描述数据类型、布局和存储，不能访问数据内容。
/// 变换布局得到的视图与原张量共享存储，最后一个引用释放时存储归还给虚拟系统。
pub struct Tensor<'vm, VM: VirtualMachine + ?Sized> {
    dt: DigitLayout,
    layout: ArrayLayout<4>,
    blob: Arc<BlobGuard<'vm, VM>>,
}

struct BlobGuard<'vm, VM: VirtualMachine + ?Sized> {
    vm: &'vm VM,
    blob: Option<VM::Blob>,
}

impl<'vm, VM: VirtualMachine + ?Sized> Tensor<'vm, VM> {
    /// 以连续布局包装 `blob`。
    pub fn new(dt: DigitLayout, shape: &[usize], blob: VM::Blob, vm: &'vm VM) -> Self {
        let layout = ArrayLayout::new_contiguous(shape, BigEndian, dt.nbytes());
        assert_eq!(n_bytes(dt, shape), blob.n_bytes());
        Self {
            dt,
            layout,
            blob: Arc::new(BlobGuard {
                vm,
                blob: Some(blob),
            }),
        }
    }
}

impl<VM: VirtualMachine + ?Sized> Clone for Tensor<'_, VM> {
    fn clone(&self) -> Self {
        Self {
            dt: self.dt,
            layout: self.layout.clone(),
            blob: self.blob.clone(),
        }
    }
}

impl<VM: VirtualMachine + ?Sized> Drop for BlobGuard<'_, VM> {
    fn drop(&mut self) {
        if let Some(blob) = self.blob.take() {
            self.vm.free(blob)
        }
    }
}

impl<VM: VirtualMachine + ?Sized> Tensor<'_, VM> {
    pub const fn dt(&self) -> DigitLayout {
        self.dt
    }

    pub fn ndim(&self) -> usize {
        self.layout.shape().len()
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    pub fn blob(&self) -> &VM::Blob {
        // 存储只在 drop 时取出
        self.blob.blob.as_ref().unwrap()
    }

    /// 判断两个张量是否共享同一块存储。
    pub fn same_blob(&self, other: &Self) -> bool {
        Blob::eq(self.blob(), other.blob())
    }
}

impl<VM: VirtualMachine + ?Sized> Tensor<'_, VM> {
    pub fn transpose(self, perm: &[usize]) -> Self {
        self.map_layout(|l| l.transpose(perm))
    }

    pub fn slice(self, axis: usize, start: usize, len: usize) -> Self {
        self.map_layout(|l| l.slice(axis, start, 1, len))
    }

    fn map_layout(mut self, f: impl FnOnce(&ArrayLayout<4>) -> ArrayLayout<4>) -> Self {
        self.layout = f(&self.layout);
        self
    }
}

/// 按 `dt` 存储形状为 `shape` 的连续张量所需的字节数。
pub fn n_bytes(dt: DigitLayout, shape: &[usize]) -> usize {
    shape.iter().product::<usize>() * dt.nbytes() / dt.group_size()
}
