use crate::{Id, device_id, pid};
use std::{fmt, sync::Arc};

const PID_LEN: usize = size_of::<pid>();
const DEV_LEN: usize = size_of::<device_id>();
const IDX_LEN: usize = size_of::<u32>();

/// 调用栈追踪器，记录当前调用点的路径。
///
/// 路径按帧编码为字节序列：`name [idx] meta`，`meta` 的高 7 位是名字长度，
/// 最低位标记是否带序号。这样编码的路径可以直接作为前缀树的键。
#[derive(Clone)]
pub struct StackTracer {
    domain: Domain,
    seq: Vec<u8>,
}

impl StackTracer {
    pub fn new(pid: pid, dev: device_id) -> Self {
        Self {
            domain: Domain { pid, dev },
            seq: Vec::new(),
        }
    }

    pub fn push(&mut self, id: impl Id) {
        let name = id.name();

        assert!(name.len() < 128);
        self.seq.extend_from_slice(name.as_bytes());

        let meta = (name.len() as u8) << 1;
        match id.idx() {
            Some(idx) => {
                let idx = u32::try_from(idx).expect("frame index overflow");
                self.seq.extend_from_slice(&idx.to_le_bytes());
                self.seq.push(meta | 1)
            }
            None => self.seq.push(meta),
        }
    }

    pub fn pop(&mut self) {
        let meta = self.seq.pop().expect("pop on empty stack");
        let len = (meta >> 1) as usize + if meta & 1 == 1 { IDX_LEN } else { 0 };
        self.seq.truncate(self.seq.len() - len)
    }

    /// 当前路径下名为 `which` 的对象。
    pub fn obj(&self, which: impl Id) -> ObjId {
        let mut temp = self.clone();
        temp.push(which);
        temp.build_obj_id(true)
    }

    pub fn path(&self) -> ObjId {
        self.clone().build_obj_id(false)
    }

    fn build_obj_id(self, is_obj: bool) -> ObjId {
        let Self { domain, mut seq } = self;
        seq.extend_from_slice(&domain.pid.to_le_bytes());
        seq.extend_from_slice(&domain.dev.to_le_bytes());
        seq.push(is_obj as u8);
        ObjId(seq.into())
    }
}

/// 对象或调用点的标识符。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjId(Arc<[u8]>);

impl AsRef<[u8]> for ObjId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ObjId {
    /// 不属于任何进程的全局路径。
    pub fn global() -> Self {
        StackTracer::new(pid::MAX, device_id::MAX).path()
    }

    pub fn is_obj(&self) -> bool {
        matches!(self.0.last(), Some(1))
    }

    fn split(&self) -> (&[u8], Domain) {
        let (body, tail) = self.0.split_at(self.0.len() - PID_LEN - DEV_LEN - 1);
        let (pid, tail) = tail.split_at(PID_LEN);
        let dev = &tail[..DEV_LEN];
        let domain = Domain {
            pid: pid::from_le_bytes(pid.try_into().unwrap()),
            dev: device_id::from_le_bytes(dev.try_into().unwrap()),
        };
        (body, domain)
    }

    pub fn domain(&self) -> String {
        self.split().1.to_string()
    }

    pub fn body(&self) -> String {
        let (mut body, _) = self.split();

        let mut frames = Vec::new();
        while let &[ref rest @ .., meta] = body {
            let len = (meta >> 1) as usize;
            let (head, idx) = if meta & 1 == 1 {
                let (head, idx) = rest.split_at(rest.len() - IDX_LEN);
                (head, Some(u32::from_le_bytes(idx.try_into().unwrap())))
            } else {
                (rest, None)
            };
            let (head, name) = head.split_at(head.len() - len);
            frames.push((String::from_utf8_lossy(name), idx));
            body = head
        }

        let mut ans = "Ω".to_string();
        for (name, idx) in frames.into_iter().rev() {
            ans.push('.');
            ans.push_str(&name);
            if let Some(idx) = idx {
                ans.push_str(&format!("#{idx}"))
            }
        }
        ans
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.domain(), self.body())
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Copy)]
struct Domain {
    pid: pid,
    dev: device_id,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let &Self { pid, dev } = self;
        write!(f, "[")?;
        match pid {
            pid::MAX => write!(f, "vm")?,
            n => write!(f, "#{n:x}")?,
        }
        write!(f, ":")?;
        match dev {
            device_id::MAX => write!(f, "H")?,
            n => write!(f, "{n}")?,
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::{ObjId, StackTracer};
    use crate::Id;

    #[derive(Clone, Copy, PartialEq, Eq)]
    struct Layer(usize);

    impl Id for Layer {
        fn name(&self) -> &str {
            "layer"
        }

        fn idx(&self) -> Option<usize> {
            Some(self.0)
        }
    }

    #[test]
    fn test_path() {
        let mut stack = StackTracer::new(3, 0);
        stack.push("rope");
        stack.push(Layer(7));

        let path = stack.path();
        assert!(!path.is_obj());
        assert_eq!(path.domain(), "[#3:0]");
        assert_eq!(path.body(), "Ω.rope.layer#7");

        let obj = stack.obj("cos");
        assert!(obj.is_obj());
        assert_eq!(obj.body(), "Ω.rope.layer#7.cos");

        stack.pop();
        assert_eq!(stack.path().body(), "Ω.rope")
    }

    #[test]
    fn test_global() {
        let global = ObjId::global();
        assert_eq!(global.domain(), "[vm:H]");
        assert_eq!(global.body(), "Ω");
        assert_eq!(global.to_string(), "[vm:H] Ω")
    }
}
